//! Unix timestamp utilities for payment authorization windows.
//!
//! Authorizations are time-bounded: `validAfter` is the earliest moment a
//! payment can execute, `validBefore` the latest. Timestamps serialize as
//! stringified integers since JavaScript numbers cannot carry all 64-bit
//! values.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// Seconds since the Unix epoch.
///
/// ```
/// use pay402::timestamp::UnixTimestamp;
///
/// let ts = UnixTimestamp::from_secs(1699999999);
/// assert_eq!(ts.as_secs(), 1699999999);
/// let later = ts + 3600;
/// assert_eq!(later.as_secs(), 1700003599);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl UnixTimestamp {
    /// Creates a timestamp from a raw seconds value.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// The current system time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_secs();
        Self(now)
    }

    /// The timestamp as raw seconds since the epoch.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(&self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_string() {
        let ts = UnixTimestamp::from_secs(1699999999);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1699999999\"");
        let parsed: UnixTimestamp = serde_json::from_str("\"1699999999\"").unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn rejects_non_integers() {
        assert!(serde_json::from_str::<UnixTimestamp>("\"-1\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"soon\"").is_err());
    }
}
