//! Serde helpers for gateway config fields

/// `connect_timeout = 30` in config.toml, stored as a [`Duration`]
///
/// Whole seconds only. Zero is rejected at load time: a host that must
/// answer in no time at all can never be reached.
///
/// [`Duration`]: std::time::Duration
pub mod timeout_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(timeout.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u64::deserialize(deserializer)? {
            0 => Err(D::Error::custom("timeout must be at least 1 second")),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}
