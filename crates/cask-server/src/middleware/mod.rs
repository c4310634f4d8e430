//! HTTP middleware

mod cookies;
mod session;

pub use session::{session_middleware, SessionError, SessionHandle};
