use serde::{Deserialize, Serialize};

use super::CommandError;

/// The application payload carried by a committed normal log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub key: String,
    pub value: String,
}

impl WriteRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CommandError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CommandError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CommandError> {
        let (record, read): (WriteRecord, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| CommandError::Decode(e.to_string()))?;

        if read != bytes.len() {
            return Err(CommandError::Decode(format!(
                "{} trailing bytes after write record",
                bytes.len() - read
            )));
        }

        Ok(record)
    }
}
