//! API route modules.

pub mod health;
pub mod session;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::middleware::session_middleware;
use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes (no session)
    let public_routes = Router::new().route("/health", get(health::health_check));

    // Session-bound routes
    let session_routes = session::router().layer(middleware::from_fn_with_state(
        state.clone(),
        session_middleware,
    ));

    Router::new()
        .merge(public_routes)
        .nest("/api", session_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StoreKind};
    use axum::body::Body;
    use axum::http::{header, Request, Response, StatusCode};
    use cask_core::codec::{DecodeError, SessionCodec};
    use cask_core::session::SessionData;
    use cask_core::SessionConfig;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn cookie_state() -> Arc<AppState> {
        AppState::new(Config::default()).unwrap()
    }

    fn memory_state() -> Arc<AppState> {
        let mut config = Config::default();
        config.session.store = StoreKind::Memory;
        AppState::new(config).unwrap()
    }

    fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri("/api/session")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response<Body> {
        create_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// The `name=value` pair of the session cookie, ready to send back
    fn session_pair(response: &Response<Body>) -> Option<String> {
        set_cookies(response)
            .into_iter()
            .find(|c| c.starts_with("cask.sess="))
            .map(|c| c.split(';').next().unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_health_has_no_session_cookie() {
        let state = cookie_state();
        let response = send(&state, request("GET", "/health", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["listen"], "127.0.0.1:3000");
        assert_eq!(body["sessions"]["key"], "cask.sess");
        assert_eq!(body["sessions"]["store"], "cookie");
        assert!(body["sessions"].get("stored").is_none());
    }

    #[tokio::test]
    async fn test_touch_rewrites_unchanged_session() {
        let state = cookie_state();
        let first = send(&state, request("GET", "/api/session", None)).await;
        let cookie = session_pair(&first).unwrap();

        let touched = send(&state, request("POST", "/api/session/touch", Some(&cookie))).await;
        assert_eq!(touched.status(), StatusCode::NO_CONTENT);
        let rewritten = session_pair(&touched).expect("session cookie rewritten");

        let next = send(&state, request("GET", "/api/session", Some(&rewritten))).await;
        assert_eq!(body_json(next).await["views"], 2);
    }

    #[tokio::test]
    async fn test_remove_field() {
        let state = cookie_state();
        let put = send(
            &state,
            json_request("PUT", json!({ "views": 5, "name": "ada" }), None),
        )
        .await;
        let cookie = session_pair(&put).unwrap();

        let uri = "/api/session/fields/name";
        let removed = send(&state, request("DELETE", uri, Some(&cookie))).await;
        assert_eq!(removed.status(), StatusCode::OK);
        let cookie = session_pair(&removed).expect("session cookie rewritten");
        assert_eq!(body_json(removed).await, json!("ada"));

        let again = send(&state, request("DELETE", uri, Some(&cookie))).await;
        assert!(set_cookies(&again).is_empty());
        assert_eq!(body_json(again).await, Value::Null);

        let next = send(&state, request("GET", "/api/session", Some(&cookie))).await;
        assert_eq!(body_json(next).await["views"], 6);
    }

    #[tokio::test]
    async fn test_cookie_mode_view_counter() {
        let state = cookie_state();

        let first = send(&state, request("GET", "/api/session", None)).await;
        assert_eq!(first.status(), StatusCode::OK);
        let cookie = session_pair(&first).expect("session cookie");
        let body = body_json(first).await;
        assert_eq!(body["views"], 1);
        assert_eq!(body["isNew"], true);
        assert!(body.get("key").is_none());

        let second = send(&state, request("GET", "/api/session", Some(&cookie))).await;
        let body = body_json(second).await;
        assert_eq!(body["views"], 2);
        assert_eq!(body["isNew"], false);
    }

    #[tokio::test]
    async fn test_replace_then_view() {
        let state = cookie_state();

        let put = send(&state, json_request("PUT", json!({ "views": 41 }), None)).await;
        assert_eq!(put.status(), StatusCode::NO_CONTENT);
        let cookie = session_pair(&put).expect("session cookie");

        let get = send(&state, request("GET", "/api/session", Some(&cookie))).await;
        assert_eq!(body_json(get).await["views"], 42);
    }

    #[tokio::test]
    async fn test_replace_with_number_is_rejected() {
        let state = cookie_state();
        let response = send(&state, json_request("PUT", json!(5), None)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_json(response).await["code"], "INVALID_SESSION_VALUE");
    }

    #[tokio::test]
    async fn test_corrupt_cookie_starts_fresh_session() {
        let state = cookie_state();
        let response = send(
            &state,
            request("GET", "/api/session", Some("cask.sess=garbage!!")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_pair(&response).is_some());
        let body = body_json(response).await;
        assert_eq!(body["views"], 1);
        assert_eq!(body["isNew"], true);
    }

    #[tokio::test]
    async fn test_clear_in_cookie_mode() {
        let state = cookie_state();
        let first = send(&state, request("GET", "/api/session", None)).await;
        let cookie = session_pair(&first).unwrap();

        let response = send(&state, request("DELETE", "/api/session", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(session_pair(&response).as_deref(), Some("cask.sess="));
    }

    #[tokio::test]
    async fn test_memory_mode_round_trip() {
        let state = memory_state();
        let store = state.store.clone().unwrap();

        let first = send(&state, request("GET", "/api/session", None)).await;
        let cookie = session_pair(&first).unwrap();
        let body = body_json(first).await;
        let key = body["key"].as_str().unwrap().to_string();
        assert_eq!(cookie, format!("cask.sess={}", key));
        assert!(store.contains(&key).await);

        let second = send(&state, request("GET", "/api/session", Some(&cookie))).await;
        let body = body_json(second).await;
        assert_eq!(body["views"], 2);
        assert_eq!(body["key"], key.as_str());

        let health = send(&state, request("GET", "/health", None)).await;
        assert_eq!(body_json(health).await["sessions"]["stored"], 1);

        let deleted = send(&state, request("DELETE", "/api/session", Some(&cookie))).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert_eq!(session_pair(&deleted).as_deref(), Some("cask.sess="));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_mode_regenerate_moves_data() {
        let state = memory_state();
        let store = state.store.clone().unwrap();

        let first = send(&state, request("GET", "/api/session", None)).await;
        let cookie = session_pair(&first).unwrap();
        let old_key = body_json(first).await["key"].as_str().unwrap().to_string();

        let regenerated = send(
            &state,
            request("POST", "/api/session/regenerate", Some(&cookie)),
        )
        .await;
        assert_eq!(regenerated.status(), StatusCode::OK);
        let new_cookie = session_pair(&regenerated).unwrap();
        let new_key = body_json(regenerated).await["key"].as_str().unwrap().to_string();

        assert_ne!(old_key, new_key);
        assert_eq!(new_cookie, format!("cask.sess={}", new_key));
        assert!(!store.contains(&old_key).await);
        assert!(store.contains(&new_key).await);

        let next = send(&state, request("GET", "/api/session", Some(&new_cookie))).await;
        assert_eq!(body_json(next).await["views"], 2);
    }

    #[tokio::test]
    async fn test_manual_commit() {
        let sessions = SessionConfig::new().with_auto_commit(false);
        let state = AppState::with_sessions(Config::default(), sessions, None);

        // The view handler commits on its own
        let viewed = send(&state, request("GET", "/api/session", None)).await;
        assert!(session_pair(&viewed).is_some());

        // Nothing commits a replacement
        let put = send(&state, json_request("PUT", json!({ "a": 1 }), None)).await;
        assert_eq!(put.status(), StatusCode::NO_CONTENT);
        assert!(set_cookies(&put).is_empty());
    }

    struct RotatingCodec;

    impl SessionCodec for RotatingCodec {
        fn encode(&self, _data: &SessionData) -> cask_core::Result<String> {
            Ok("sealed".to_string())
        }

        fn decode(&self, _raw: &str) -> Result<SessionData, DecodeError> {
            Err(DecodeError::fault("signing key unavailable"))
        }
    }

    #[tokio::test]
    async fn test_decode_fault_keeps_clearing_cookie() {
        let sessions = SessionConfig::new().with_codec(Arc::new(RotatingCodec));
        let state = AppState::with_sessions(Config::default(), sessions, None);

        let response = send(
            &state,
            request("GET", "/api/session", Some("cask.sess=sealed")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("cask.sess=;"));
        assert_eq!(body_json(response).await["code"], "SESSION_DECODE_FAULT");
    }
}
