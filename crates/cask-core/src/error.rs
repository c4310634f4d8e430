//! Error types for cask-core.

use thiserror::Error;

/// Result type alias using cask-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for session operations
#[derive(Error, Debug)]
pub enum Error {
    /// The session was assigned something other than an object or null.
    #[error("Session can only be set as null or an object, got {0}")]
    InvalidSessionValue(String),

    /// The cookie payload could not be decoded for a reason other than
    /// malformed input. The cookie has already been cleared; `set_cookie`
    /// holds every `Set-Cookie` value staged on the response so far.
    #[error("Session cookie decode failed: {message}")]
    DecodeFault {
        message: String,
        set_cookie: Vec<String>,
    },

    // Store errors
    #[error("Session store error: {0}")]
    Store(anyhow::Error),

    // Codec errors
    #[error("Session encode error: {0}")]
    Codec(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a failure from an external store backend
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        Self::Store(err.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an encode error
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// `Set-Cookie` values that must survive error handling, if any
    pub fn preserved_set_cookie(&self) -> &[String] {
        match self {
            Self::DecodeFault { set_cookie, .. } => set_cookie,
            _ => &[],
        }
    }

    /// Check if this error was raised by the store backend
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::store(anyhow::anyhow!("connection refused"));
        assert!(err.is_store());
        assert!(err.to_string().contains("connection refused"));

        let err = Error::InvalidSessionValue("number".to_string());
        assert!(!err.is_store());
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_preserved_set_cookie() {
        let err = Error::DecodeFault {
            message: "boom".to_string(),
            set_cookie: vec!["cask.sess=; Path=/".to_string()],
        };
        assert_eq!(err.preserved_set_cookie().len(), 1);
        assert!(Error::config("empty key").preserved_set_cookie().is_empty());
    }
}
