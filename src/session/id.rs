//! Invocation identifier type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one asynchronous invocation.
///
/// Allocated by an [`InstanceRegistry`](super::InstanceRegistry) from its own
/// counter, so identifiers are unique for the lifetime of the owning engine.
/// Displayed as `inv-XXXXXXXX` (hexadecimal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(u64);

impl InvocationId {
    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Wrap a raw value, e.g. one handed back by a caller.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv-{:08x}", self.0)
    }
}

impl FromStr for InvocationId {
    type Err = crate::error::ZrunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("inv-")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map(InvocationId)
            .ok_or_else(|| crate::error::ZrunError::InvalidInvocationId(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(InvocationId::from_raw(255).to_string(), "inv-000000ff");
        assert_eq!(InvocationId::from_raw(0x1234_5678).to_string(), "inv-12345678");
    }

    #[test]
    fn test_parse() {
        let id: InvocationId = "inv-0000002a".parse().unwrap();
        assert_eq!(id.as_u64(), 42);

        assert!("0000002a".parse::<InvocationId>().is_err());
        assert!("sess-0000002a".parse::<InvocationId>().is_err());
        assert!("inv-zz".parse::<InvocationId>().is_err());
        assert!("".parse::<InvocationId>().is_err());
    }

    #[test]
    fn test_roundtrip_display() {
        let id = InvocationId::from_raw(u64::from(u32::MAX) + 1);
        let parsed: InvocationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&InvocationId::from_raw(9)).unwrap();
        assert_eq!(json, "9");
    }
}
