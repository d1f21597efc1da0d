use rdkafka::message::{BorrowedMessage, Headers, Message, OwnedHeaders};
use serde::de::DeserializeOwned;

use crate::kafka::types::Partition;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("message at {partition}@{offset} has no payload")]
    Empty { partition: Partition, offset: i64 },
    #[error("failed to decode payload: {0}")]
    Serde(#[from] serde_json::Error),
}

/// An owned copy of a delivered record. Workers only ever read it.
#[derive(Debug, Clone)]
pub struct ConsumedMessage {
    partition: Partition,
    offset: i64,
    key: Option<Vec<u8>>,
    payload: Option<Vec<u8>>,
    /// Broker or producer timestamp in epoch millis, when the record carries one
    timestamp_ms: Option<i64>,
    headers: Option<OwnedHeaders>,
}

impl ConsumedMessage {
    pub fn new(partition: Partition, offset: i64) -> Self {
        Self {
            partition,
            offset,
            key: None,
            payload: None,
            timestamp_ms: None,
            headers: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_headers(mut self, headers: OwnedHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Copy the parts of a borrowed librdkafka message we hand to workers.
    pub fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        Self {
            partition: Partition::new(msg.topic(), msg.partition()),
            offset: msg.offset(),
            key: msg.key().map(|k| k.to_vec()),
            payload: msg.payload().map(|p| p.to_vec()),
            timestamp_ms: msg.timestamp().to_millis(),
            headers: msg.headers().map(|h| h.detach()),
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn topic(&self) -> &str {
        self.partition.topic()
    }

    pub fn partition_number(&self) -> i32 {
        self.partition.partition_number()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The offset the group resumes from once this message is committed.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    pub fn headers(&self) -> Option<&OwnedHeaders> {
        self.headers.as_ref()
    }

    /// First header value stored under `key`.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .as_ref()?
            .iter()
            .find(|h| h.key == key)
            .and_then(|h| h.value)
    }

    /// Get the message key as a UTF-8 string if possible
    pub fn key_as_str(&self) -> Option<Result<&str, std::str::Utf8Error>> {
        self.key.as_ref().map(|k| std::str::from_utf8(k))
    }

    pub fn payload_json<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        let Some(payload) = self.payload.as_deref() else {
            return Err(PayloadError::Empty {
                partition: self.partition.clone(),
                offset: self.offset,
            });
        };
        Ok(serde_json::from_slice(payload)?)
    }
}
