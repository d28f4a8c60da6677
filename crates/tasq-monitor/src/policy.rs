//! Scale policy: converts a stream of queue-depth samples into a
//! worker-count suggestion.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tasq_client::QueueStat;

/// A policy consumes periodic queue-depth samples and suggests a worker
/// count. `suggest` returning `None` means "no change".
///
/// `sample` and `suggest` are called from independent loops and must be safe
/// to call concurrently.
pub trait ScalePolicy: Send + Sync {
    fn sample_interval(&self) -> Duration;

    fn sample(&self, stat: QueueStat);

    fn suggest(&self) -> Option<u32>;
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixedScalePolicyOptions {
    pub sample_interval_secs: u64,
    /// Worker count to scale out to.
    pub target: u32,
    /// Consecutive non-empty samples required before scaling out.
    pub scale_out_look_back: usize,
    /// Consecutive empty samples required before scaling in. Longer than
    /// the scale-out window so transient lulls don't kill workers.
    pub scale_in_look_back: usize,
}

impl Default for FixedScalePolicyOptions {
    fn default() -> Self {
        Self {
            sample_interval_secs: 2,
            target: 5,
            scale_out_look_back: 5,
            scale_in_look_back: 10,
        }
    }
}

impl FixedScalePolicyOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_interval_secs == 0 {
            return Err("sample_interval_secs must be >= 1".to_string());
        }
        if self.target == 0 {
            return Err("target must be >= 1".to_string());
        }
        if self.scale_out_look_back == 0 || self.scale_in_look_back == 0 {
            return Err("look-back windows must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Hysteresis over a sliding window of depth samples.
///
/// Scale-out fires when every one of the most recent `scale_out_look_back`
/// samples saw work present (a sustained backlog no existing worker is
/// draining). Scale-in fires only after the longer `scale_in_look_back`
/// window has been continuously empty. Anything in between suggests no
/// change.
pub struct FixedScalePolicy {
    options: FixedScalePolicyOptions,
    history_size: usize,
    history: Mutex<VecDeque<QueueStat>>,
}

impl FixedScalePolicy {
    pub fn new(options: FixedScalePolicyOptions) -> Self {
        let history_size = options.scale_out_look_back.max(options.scale_in_look_back);
        Self {
            options,
            history_size,
            history: Mutex::new(VecDeque::with_capacity(history_size)),
        }
    }
}

impl ScalePolicy for FixedScalePolicy {
    fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.options.sample_interval_secs)
    }

    fn sample(&self, stat: QueueStat) {
        let mut history = self.history.lock().expect("policy history poisoned");
        if history.len() == self.history_size {
            history.pop_front();
        }
        history.push_back(stat);
    }

    fn suggest(&self) -> Option<u32> {
        let history = self.history.lock().expect("policy history poisoned");

        // Scale-out check first: work continuously present across the
        // recent window.
        if history.len() >= self.options.scale_out_look_back {
            let mut recent = history
                .iter()
                .skip(history.len() - self.options.scale_out_look_back);
            if recent.all(|stat| stat.message_total > 0) {
                return Some(self.options.target);
            }
        }

        // Scale-in check: queue empty for the longer window.
        if history.len() >= self.options.scale_in_look_back {
            let mut recent = history
                .iter()
                .skip(history.len() - self.options.scale_in_look_back);
            if recent.all(|stat| stat.message_total == 0) {
                return Some(0);
            }
        }

        None
    }
}
