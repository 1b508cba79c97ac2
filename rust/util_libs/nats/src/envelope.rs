//! Wire shape shared by every request and reply exchanged over the bus.
//!
//! An envelope is `{ "id": <correlation id>, "type": <kind>, "payload": <json> }`. The payload is kept
//! as raw json until the caller knows which concrete shape the `type` tag stands for.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag carried by a successful reply to a mutating command.
pub const KIND_OK: &str = "ok";
/// Tag carried by a reply whose payload is an [`ErrorPayload`].
pub const KIND_ERROR: &str = "error";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Payload of '{kind}' does not match the expected shape: {reason}")]
    SchemaMismatch { kind: String, reason: String },
}

impl EnvelopeError {
    /// Returns true if this is a Malformed error
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Returns true if this is a SchemaMismatch error
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Reported by the remote service inside an envelope tagged [`KIND_ERROR`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

// Only the correlation id of a reply, used to route it without decoding the payload.
#[derive(Deserialize)]
struct EnvelopeId {
    id: String,
}

impl Envelope {
    /// Wraps an in-memory payload under the given correlation id and kind.
    pub fn new<P: Serialize>(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: &P,
    ) -> Result<Self, EnvelopeError> {
        let kind = kind.into();
        let payload = serde_json::to_value(payload).map_err(|e| EnvelopeError::SchemaMismatch {
            kind: kind.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: id.into(),
            kind,
            payload,
        })
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: KIND_ERROR.to_string(),
            payload: serde_json::json!({ "message": message.into() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == KIND_ERROR
    }

    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(data).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Reads the payload as `T`. Fails with `SchemaMismatch` when the payload is not a `T`,
    /// which usually means the caller expected a different variant.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        T::deserialize(&self.payload).map_err(|e| EnvelopeError::SchemaMismatch {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }

    /// Extracts the correlation id of serialized envelope bytes, `None` if they are not an envelope.
    pub fn peek_id(data: &[u8]) -> Option<String> {
        serde_json::from_slice::<EnvelopeId>(data)
            .ok()
            .map(|envelope| envelope.id)
    }
}
