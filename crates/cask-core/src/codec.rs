//! Cookie payload codec.
//!
//! Codecs classify their own decode failures: [`DecodeError::Corrupt`] means
//! the payload is simply not a session (treated as no session), while
//! [`DecodeError::Fault`] is an unexpected failure that must reach the caller.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::session::SessionData;

/// Decode failure classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Structurally malformed payload
    #[error("malformed session payload: {0}")]
    Corrupt(String),

    /// Any other decode failure
    #[error("{0}")]
    Fault(String),
}

impl DecodeError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt(reason.into())
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        Self::Fault(reason.into())
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}

/// Turns session data into a cookie-safe string and back.
pub trait SessionCodec: Send + Sync {
    fn encode(&self, data: &SessionData) -> Result<String>;

    fn decode(&self, raw: &str) -> std::result::Result<SessionData, DecodeError>;
}

/// Base64 (standard alphabet) of the JSON object.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64JsonCodec;

impl SessionCodec for Base64JsonCodec {
    fn encode(&self, data: &SessionData) -> Result<String> {
        let json = serde_json::to_vec(data).map_err(|e| Error::codec(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    fn decode(&self, raw: &str) -> std::result::Result<SessionData, DecodeError> {
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|e| DecodeError::corrupt(format!("invalid base64: {}", e)))?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DecodeError::corrupt(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(DecodeError::corrupt(format!("invalid JSON: {}", e))),
        }
    }
}

/// Human-readable JSON type name
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
