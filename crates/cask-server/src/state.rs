//! Application state.

use cask_core::{MemoryStore, SessionConfig};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, StoreKind};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Session options shared by every request
    pub sessions: Arc<SessionConfig>,
    /// In-process session store, when configured
    pub store: Option<Arc<MemoryStore>>,
    /// Server start time
    pub start_time: Instant,
    /// Requests currently inside the session layer
    pub active_requests: Arc<AtomicUsize>,
}

impl AppState {
    /// Create new application state from configuration
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let mut sessions = config.session.to_session_config()?;

        let store = match config.session.store {
            StoreKind::Cookie => None,
            StoreKind::Memory => {
                let store = Arc::new(MemoryStore::new());
                sessions = sessions.with_store(store.clone());
                Some(store)
            }
        };

        Ok(Self::with_sessions(config, sessions, store))
    }

    /// Create state around prepared session options
    pub fn with_sessions(
        config: Config,
        sessions: SessionConfig,
        store: Option<Arc<MemoryStore>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            store,
            start_time: Instant::now(),
            active_requests: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Name of the configured session backend
    pub fn store_kind(&self) -> &'static str {
        if self.sessions.has_store() {
            "memory"
        } else {
            "cookie"
        }
    }
}
