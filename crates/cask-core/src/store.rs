//! External session store contract.
//!
//! With a store configured the cookie only carries an opaque ExternalKey and
//! the session data lives in the backend under that key.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::config::MaxAge;
use crate::error::Result;
use crate::session::SessionData;

/// Options for [`SessionStore::get`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Refresh the backend's own TTL on read
    pub rolling: bool,
}

/// Options for [`SessionStore::set`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Content differs from what was loaded
    pub changed: bool,
    /// Rolling mode is enabled
    pub rolling: bool,
}

/// Storage backend for session data.
///
/// Implementations are expected to make each call atomic on their side;
/// failures are reported as [`crate::Error::Store`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch session data. `None` when the key is unknown or expired.
    async fn get(
        &self,
        key: &str,
        max_age: MaxAge,
        options: GetOptions,
    ) -> Result<Option<SessionData>>;

    /// Write session data under `key`.
    async fn set(
        &self,
        key: &str,
        data: &SessionData,
        max_age: MaxAge,
        options: SetOptions,
    ) -> Result<()>;

    /// Delete the entry. Unknown keys are not an error.
    async fn destroy(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoreEntry {
    data: SessionData,
    /// Epoch ms after which the entry is gone; `None` never expires
    expires_at: Option<i64>,
}

/// In-process store with per-entry TTL.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn deadline(&self, max_age: MaxAge) -> Option<i64> {
        max_age
            .as_millis()
            .map(|ms| {
                self.clock
                    .now_ms()
                    .saturating_add(i64::try_from(ms).unwrap_or(i64::MAX))
            })
    }

    fn is_expired(&self, entry: &StoreEntry) -> bool {
        entry
            .expires_at
            .is_some_and(|at| at < self.clock.now_ms())
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !self.is_expired(e)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries.get(key).is_some_and(|e| !self.is_expired(e))
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(
        &self,
        key: &str,
        max_age: MaxAge,
        options: GetOptions,
    ) -> Result<Option<SessionData>> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) => self.is_expired(entry),
            None => return Ok(None),
        };
        if expired {
            trace!(key, "purging expired entry");
            entries.remove(key);
            return Ok(None);
        }

        let deadline = self.deadline(max_age);
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if options.rolling {
            entry.expires_at = deadline;
        }
        Ok(Some(entry.data.clone()))
    }

    async fn set(
        &self,
        key: &str,
        data: &SessionData,
        max_age: MaxAge,
        options: SetOptions,
    ) -> Result<()> {
        trace!(key, changed = options.changed, rolling = options.rolling, "store set");
        let entry = StoreEntry {
            data: data.clone(),
            expires_at: self.deadline(max_age),
        };
        let mut entries = self.entries.write().await;
        // Keys never presented again are only reclaimed here.
        entries.retain(|_, e| !self.is_expired(e));
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}
