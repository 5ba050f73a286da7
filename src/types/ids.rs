use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::error::Error;
use crate::types::timestamp::Timestamp;

/// Identifier of a single activation attempt.
///
/// Built from the hybrid logical clock plus a random suffix, so two ids minted
/// in the same millisecond (or after the wall clock steps backwards) still
/// differ and still sort in issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId {
    pub issued_at: Timestamp,
    pub suffix: u32,
}

impl RequestId {
    pub fn new() -> Self {
        RequestId {
            issued_at: Timestamp::now(),
            suffix: random_suffix(),
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

fn random_suffix() -> u32 {
    // Low 32 bits of a v4 uuid are random
    (Uuid::new_v4().as_u128() & 0xffff_ffff) as u32
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:08x}",
            self.issued_at.physical, self.issued_at.logical, self.suffix
        )
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidRequestId(s.to_string());

        let mut parts = s.splitn(3, '-');
        let physical = parts.next().and_then(|p| p.parse::<u64>().ok()).ok_or_else(invalid)?;
        let logical = parts.next().and_then(|p| p.parse::<u64>().ok()).ok_or_else(invalid)?;
        let suffix = parts
            .next()
            .and_then(|p| u32::from_str_radix(p, 16).ok())
            .ok_or_else(invalid)?;

        Ok(RequestId {
            issued_at: Timestamp { physical, logical },
            suffix,
        })
    }
}

/// Configured name of a delivery channel, e.g. `emergency-services`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(pub String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        ChannelName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        ChannelName(name.to_string())
    }
}
