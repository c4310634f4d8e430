//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub listen: String,
    pub sessions: SessionMetrics,
}

#[derive(Serialize)]
pub struct SessionMetrics {
    pub key: String,
    pub store: String,
    pub rolling: bool,
    /// Live entries in the in-process store; absent in cookie mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<usize>,
    pub pending_requests: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let stored = match &state.store {
        Some(store) => Some(store.len().await),
        None => None,
    };

    Json(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        listen: state.config.listen.clone(),
        sessions: SessionMetrics {
            key: state.sessions.key.clone(),
            store: state.store_kind().to_string(),
            rolling: state.sessions.rolling,
            stored,
            pending_requests: state.active_requests.load(Ordering::SeqCst),
        },
    })
}
