use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default first reconnect ceiling.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default maximum reconnect ceiling.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Exponential reconnect policy using "full jitter": each delay is drawn uniformly from
/// `[0, min(cap, base * 2^attempt)]`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "duration_ms", rename = "base_ms")]
    pub base: Duration,
    #[serde(with = "duration_ms", rename = "cap_ms")]
    pub cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl ReconnectPolicy {
    /// Upper bound of the delay for the provided zero-based attempt.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Construct a fresh [`Backoff`] driven by this policy.
    pub fn backoff(self) -> Backoff {
        Backoff {
            policy: self,
            attempt: 0,
        }
    }
}

/// Stateful reconnect delay generator.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Number of consecutive failed attempts since the last [`Backoff::reset`].
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Generate the next jittered delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.policy.ceiling(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
    }

    /// Reset after a healthy connection was established.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Serialise a [`Duration`] as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
