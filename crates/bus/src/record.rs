use newswire_core::Submission;

use crate::error::BusError;

/// One entry of the append log: key = submission id, value = canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Partition the record was read from; `None` before it is written.
    pub partition: Option<u32>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            partition: None,
        }
    }

    /// Encode a submission keyed by its id.
    pub fn from_submission(post: &Submission) -> Result<Self, BusError> {
        Ok(Self::new(post.id.as_bytes(), post.to_json()?))
    }

    pub fn decode(&self) -> Result<Submission, serde_json::Error> {
        Submission::from_json(&self.value)
    }

    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    /// Bytes the balancer charges for this record.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}
