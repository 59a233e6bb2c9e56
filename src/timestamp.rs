use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// A Unix timestamp in milliseconds, as carried in payment payloads.
///
/// Payment payloads stamp their creation time in milliseconds since the Unix
/// epoch (the `Date.now()` convention of the x402 client SDKs), and the
/// facilitator compares it against the replay window during verification.
///
/// Serialized as a plain JSON integer, never a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixMillis(pub u64);

impl UnixMillis {
    /// Current wall-clock time. Clamps to zero if the system clock reads
    /// before the Unix epoch.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        Self(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    /// Milliseconds elapsed from `earlier` to `self`, zero if `earlier` is in
    /// the future.
    pub fn saturating_since(self, earlier: UnixMillis) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Display for UnixMillis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UnixMillis {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
