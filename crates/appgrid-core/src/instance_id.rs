//! Instance and job identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid instance id: {0:?}")]
pub struct InvalidInstanceId(pub String);

/// 32-bit instance identifier, rendered as 8 lower-case hex digits.
///
/// Zero is a legal value but also what lossy parsing falls back to, so
/// callers that need to tell the two apart should use `str::parse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u32);

impl InstanceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Draw an id from the OS random source.
    pub fn new_random() -> Self {
        let mut buf = [0u8; 4];
        // Clock fallback when the OS source is unavailable.
        if getrandom::getrandom(&mut buf).is_err() {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
                .unwrap_or_default();
            return Self(nanos);
        }
        Self(u32::from_ne_bytes(buf))
    }

    /// Parse up to 8 hex digits; anything else yields the zero id.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self(0))
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn hex(self) -> String {
        format!("{:08x}", self.0)
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = InvalidInstanceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidInstanceId(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| InvalidInstanceId(s.to_string()))
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self::parse_lossy(s)
    }
}

impl From<u32> for InstanceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Scheduler job identifier. `JobId::NONE` means "no job".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u32);

impl JobId {
    pub const NONE: JobId = JobId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for JobId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}
