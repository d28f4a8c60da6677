use std::collections::HashMap;

use serde::Deserialize;

use crate::error::EngineError;

/// Default message lease when neither the queue nor the call specifies one.
pub const DEFAULT_LEASE_SECS: i64 = 60;

/// Per-queue lease configuration: a global default plus optional per-queue
/// overrides. The effective lease for a claim is the per-call value when
/// given, else the queue's override, else the default.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeaseConfig {
    pub default_lease_secs: i64,
    /// Queue name -> lease seconds.
    pub leases: HashMap<String, i64>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_lease_secs: DEFAULT_LEASE_SECS,
            leases: HashMap::new(),
        }
    }
}

impl LeaseConfig {
    pub fn lease_for(&self, queue: &str) -> i64 {
        self.leases
            .get(queue)
            .copied()
            .unwrap_or(self.default_lease_secs)
    }
}

/// Validate a queue name before it reaches storage.
///
/// The empty string and `"*"` are reserved. Names are restricted to
/// printable ASCII without whitespace or `/` so they embed cleanly in URL
/// paths and storage key prefixes.
pub fn validate_queue_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name == "*" {
        return Err(EngineError::InvalidQueueName(name.to_string()));
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_graphic() && c != '/' && c != '*');
    if !ok {
        return Err(EngineError::InvalidQueueName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_and_malformed_names_rejected() {
        for bad in ["", "*", "a b", "a/b", "naïve", "tab\tname"] {
            assert!(
                validate_queue_name(bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
        for good in ["orders", "orders-v2", "Orders_2.backlog", "q"] {
            assert!(validate_queue_name(good).is_ok(), "{good:?} should pass");
        }
    }

    #[test]
    fn lease_lookup_falls_back_to_default() {
        let config: LeaseConfig = toml::from_str(
            r#"
            default_lease_secs = 30

            [leases]
            orders = 120
        "#,
        )
        .unwrap();
        assert_eq!(config.lease_for("orders"), 120);
        assert_eq!(config.lease_for("other"), 30);
        assert_eq!(LeaseConfig::default().lease_for("x"), DEFAULT_LEASE_SECS);
    }
}
