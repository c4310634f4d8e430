//! Session routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::middleware::{SessionError, SessionHandle};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/session",
            get(view_session).put(replace_session).delete(clear_session),
        )
        .route("/session/regenerate", post(regenerate_session))
        .route("/session/touch", post(touch_session))
        .route("/session/fields/{field}", delete(remove_field))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub views: u64,
    pub is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub key: Option<String>,
}

/// Count views of the current session
async fn view_session(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
) -> Result<Json<SessionView>, SessionError> {
    let views = session.get::<u64>("views").await?.unwrap_or(0) + 1;
    session.insert("views", views).await?;
    let is_new = session.is_new().await?;

    if !state.sessions.auto_commit {
        session.commit().await?;
    }

    Ok(Json(SessionView {
        views,
        is_new,
        key: session.external_key().await,
    }))
}

/// Replace the session with the request body
async fn replace_session(
    session: SessionHandle,
    Json(body): Json<Value>,
) -> Result<StatusCode, SessionError> {
    session.set(body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Unset the session
async fn clear_session(session: SessionHandle) -> Result<StatusCode, SessionError> {
    session.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Persist the session at commit even though nothing changed
async fn touch_session(session: SessionHandle) -> Result<StatusCode, SessionError> {
    session.force_save().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drop one field from the session
async fn remove_field(
    session: SessionHandle,
    Path(field): Path<String>,
) -> Result<Json<Value>, SessionError> {
    let removed = session.remove(&field).await?;
    Ok(Json(removed.unwrap_or(Value::Null)))
}

/// Move the session data to a fresh key
async fn regenerate_session(
    session: SessionHandle,
) -> Result<Json<RegenerateResponse>, SessionError> {
    let old_key = session.external_key().await;
    let data = session.with(|s| s.to_json()).await?;

    session.regenerate().await?;
    if let Some(data) = data.filter(|data| !data.is_empty()) {
        session.set(Value::Object(data)).await?;
    }

    let key = session.external_key().await;
    info!(?old_key, ?key, "session regenerated");
    Ok(Json(RegenerateResponse { key }))
}
