//! End-to-end test crate. All content lives in `tests/`.
