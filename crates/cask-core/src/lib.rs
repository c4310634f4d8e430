//! cask-core - Core library for cask
//!
//! Per-request session lifecycle shared by any request-handling layer:
//!
//! - **session**: Session container, change detection, validity checks
//! - **store**: External key-value store contract and an in-memory store
//! - **codec**: Cookie payload codec contract and the base64 JSON codec
//! - **transport**: Request context / cookie transport contract
//! - **context**: The lifecycle controller (load, mutate, commit)
//! - **config**: Session options and defaults

pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use config::{MaxAge, SessionConfig};
pub use context::{CommitOutcome, SessionContext};
pub use error::{Error, Result};
pub use session::Session;
pub use store::{MemoryStore, SessionStore};
pub use transport::RequestContext;
