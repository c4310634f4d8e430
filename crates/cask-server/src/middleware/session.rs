//! Session middleware for cask-server.
//!
//! Binds one [`SessionContext`] to each request:
//!
//! ```text
//! request ─► parse Cookie ─► (store) init_from_external ─► handler
//!                                                            │
//! response ◄─ append Set-Cookie ◄─ commit (auto_commit) ◄────┘
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use cask_core::{CommitOutcome, Session, SessionContext};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::cookies::HeaderCookies;
use crate::state::AppState;

/// Session error surfaced to the client
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] cask_core::Error),

    #[error("Session layer is not installed on this route")]
    MissingLayer,

    #[error("No active session")]
    NoSession,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SessionError::Core(cask_core::Error::InvalidSessionValue(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_SESSION_VALUE")
            }
            SessionError::Core(cask_core::Error::DecodeFault { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_DECODE_FAULT")
            }
            SessionError::Core(cask_core::Error::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_STORE_ERROR")
            }
            SessionError::Core(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_ERROR"),
            SessionError::MissingLayer => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MISSING_SESSION_LAYER")
            }
            SessionError::NoSession => (StatusCode::CONFLICT, "NO_SESSION"),
        };
        if status.is_server_error() {
            error!(error = %self, "session error");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });
        let mut response = (status, body).into_response();

        // Keep cookies staged before the failure, including the clearing one.
        if let SessionError::Core(err) = &self {
            for value in err.preserved_set_cookie() {
                if let Ok(value) = value.parse() {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
        }
        response
    }
}

/// Handle to the request's session, available to handlers as an extractor.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionContext<HeaderCookies>>>,
}

impl SessionHandle {
    fn new(context: SessionContext<HeaderCookies>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Run `f` against the active session, `None` if it was unset.
    pub async fn with<R>(
        &self,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<Option<R>, SessionError> {
        let mut context = self.inner.lock().await;
        Ok(context.get()?.map(f))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        Ok(self.with(|session| session.get(key)).await?.flatten())
    }

    pub async fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        self.with(|session| session.insert(key, value))
            .await?
            .ok_or(SessionError::NoSession)??;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.with(|session| session.remove(key)).await?.flatten())
    }

    /// Replace the whole session; `null` unsets it.
    pub async fn set(&self, value: Value) -> Result<(), SessionError> {
        self.inner.lock().await.set(value)?;
        Ok(())
    }

    /// Unset the session; it is removed at commit.
    pub async fn clear(&self) -> Result<(), SessionError> {
        self.set(Value::Null).await
    }

    /// Persist at commit even if unchanged.
    pub async fn force_save(&self) -> Result<(), SessionError> {
        self.with(Session::force_save)
            .await?
            .ok_or(SessionError::NoSession)
    }

    pub async fn regenerate(&self) -> Result<(), SessionError> {
        self.inner.lock().await.regenerate().await?;
        Ok(())
    }

    /// Commit now; used when `auto_commit` is off.
    pub async fn commit(&self) -> Result<CommitOutcome, SessionError> {
        Ok(self.inner.lock().await.commit().await?)
    }

    pub async fn external_key(&self) -> Option<String> {
        self.inner.lock().await.external_key().map(String::from)
    }

    pub async fn is_new(&self) -> Result<bool, SessionError> {
        Ok(self.with(|session| session.is_new()).await?.unwrap_or(false))
    }
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or(SessionError::MissingLayer)
    }
}

/// Session middleware for axum
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, SessionError> {
    state.active_requests.fetch_add(1, Ordering::SeqCst);
    let result = run_with_session(&state, request, next).await;
    state.active_requests.fetch_sub(1, Ordering::SeqCst);
    result
}

async fn run_with_session(
    state: &Arc<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, SessionError> {
    let cookies = HeaderCookies::from_headers(request.headers());
    let mut context = SessionContext::new(cookies, Arc::clone(&state.sessions));

    // Store-backed sessions are loaded before the handler runs.
    if context.has_store() {
        context.init_from_external().await?;
    }

    let handle = SessionHandle::new(context);
    request.extensions_mut().insert(handle.clone());

    let mut response = next.run(request).await;

    let mut context = handle.inner.lock().await;
    if state.sessions.auto_commit {
        let outcome = context.commit().await?;
        debug!(?outcome, "session committed");
    }

    // Skip values an error response already carries.
    let existing: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .cloned()
        .collect();
    for value in context.request().set_cookie_headers() {
        if !existing.contains(&value) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}
