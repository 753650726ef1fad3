//! Shared pieces of the sender/receiver demo pair.

use serde::{Deserialize, Serialize};

/// Service scope both demo binaries run under.
pub const SERVICE: &str = "metering";

/// Logical topic the readings flow on.
pub const TOPIC: &str = "readings";

/// Counter reading exchanged by the demo binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub value: i64,
}

impl Reading {
    pub fn new(value: i64) -> Self {
        Self { value }
    }

    pub fn to_bytes(self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_roundtrips() {
        let reading = Reading::new(42);
        let bytes = reading.to_bytes().unwrap();
        assert_eq!(Reading::from_bytes(&bytes).unwrap(), reading);
    }
}
