use serde::{Deserialize, Serialize};

/// Envelope for a single published event.
///
/// The payload is opaque to the messaging layer; producers and consumers
/// agree on its encoding out of band. On the wire the envelope is a
/// single-field JSON object keyed `Data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "Data")]
    data: Vec<u8>,
}

impl Event {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
