//! Per-request session lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//!                    get() / init_from_*() / set(object)
//!   Unresolved ─────────────────────────────────────────► Active(Session)
//!       │                                                     │
//!       │ set(null)                                 set(null) │
//!       ▼                                                     ▼
//!     Unset ◄──────────────────────────────────────────────────
//!
//! commit():  Unresolved ─► nothing
//!            Unset      ─► remove (store destroy + empty cookie)
//!            Active     ─► save if changed / forced / rolling / due for renewal
//! ```
//!
//! One [`SessionContext`] is bound to exactly one request and is dropped
//! with it.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::{json_kind, DecodeError};
use crate::config::{MaxAge, SessionConfig};
use crate::error::{Error, Result};
use crate::session::{
    fingerprint, Session, SessionData, Validator, EXPIRE_FIELD, MAX_AGE_FIELD, SESSION_FIELD,
};
use crate::store::{GetOptions, SessionStore, SetOptions};
use crate::transport::{CookieAttributes, RequestContext};

/// The controller's reference to the request's session.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionSlot {
    /// Nothing has touched the session yet
    #[default]
    Unresolved,
    /// Explicitly cleared by the application
    Unset,
    /// Loaded or freshly created
    Active(Session),
}

/// Why a commit wrote nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// New session that was never populated
    EmptyNew,
    /// Content unchanged and no rolling or renewal due
    Unchanged,
}

/// What [`SessionContext::commit`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The session was never accessed
    Untouched,
    /// Nothing needed persisting
    Skipped(SkipReason),
    /// The session was persisted
    Saved { changed: bool },
    /// The session was removed
    Removed,
}

/// Session lifecycle controller for one request.
pub struct SessionContext<C: RequestContext> {
    ctx: C,
    config: Arc<SessionConfig>,
    store: Option<Arc<dyn SessionStore>>,
    validator: Validator,
    slot: SessionSlot,
    external_key: Option<String>,
    prev_hash: Option<String>,
}

impl<C: RequestContext> SessionContext<C> {
    /// Bind a controller to the request context.
    pub fn new(ctx: C, config: Arc<SessionConfig>) -> Self {
        let store = config.store().map(|source| source.resolve(&ctx));
        let validator = Validator::new(config.valid());
        Self {
            ctx,
            config,
            store,
            validator,
            slot: SessionSlot::Unresolved,
            external_key: None,
            prev_hash: None,
        }
    }

    pub fn request(&self) -> &C {
        &self.ctx
    }

    pub fn request_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Give the request context back, e.g. to flush staged cookies.
    pub fn into_request(self) -> C {
        self.ctx
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    pub fn external_key(&self) -> Option<&str> {
        self.external_key.as_deref()
    }

    /// The active session, loading it from the cookie on first access.
    ///
    /// In store mode the session must have been loaded with
    /// [`init_from_external`](Self::init_from_external) beforehand;
    /// `None` is returned until then, and after the session was unset.
    pub fn get(&mut self) -> Result<Option<&mut Session>> {
        if self.slot == SessionSlot::Unresolved && self.store.is_none() {
            self.init_from_cookie()?;
        }
        match &mut self.slot {
            SessionSlot::Active(session) => Ok(Some(session)),
            SessionSlot::Unset | SessionSlot::Unresolved => Ok(None),
        }
    }

    /// Replace the session. `null` unsets it, an object becomes the new
    /// session data (keeping the current ExternalKey).
    pub fn set(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Null => {
                debug!("session unset");
                self.slot = SessionSlot::Unset;
                Ok(())
            }
            Value::Object(data) => {
                let key = self.external_key.take();
                self.create(Some(data), key);
                Ok(())
            }
            other => Err(Error::InvalidSessionValue(json_kind(&other).to_string())),
        }
    }

    /// Load the session through the ExternalKey carried by the cookie.
    ///
    /// A missing key, an unknown key, or invalid data all yield a fresh
    /// session under a new key.
    pub async fn init_from_external(&mut self) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Err(Error::config("init_from_external requires a session store"));
        };
        debug!("init from external");

        let external_key = self
            .ctx
            .cookie(&self.config.key)
            .filter(|key| !key.is_empty());
        debug!(?external_key, "get external key from cookie");
        let Some(external_key) = external_key else {
            self.create(None, None);
            return Ok(());
        };

        let options = GetOptions {
            rolling: self.config.rolling,
        };
        let data = store
            .get(&external_key, self.config.max_age, options)
            .await?;

        match data {
            Some(data) if self.is_valid(Some(&data)) => {
                self.create(Some(data), Some(external_key));
                self.record_fingerprint();
            }
            _ => self.create(None, None),
        }
        Ok(())
    }

    /// Load the session from the cookie payload itself.
    pub fn init_from_cookie(&mut self) -> Result<()> {
        debug!("init from cookie");
        let Some(raw) = self
            .ctx
            .cookie(&self.config.key)
            .filter(|raw| !raw.is_empty())
        else {
            self.create(None, None);
            return Ok(());
        };

        let data = match self.config.codec().decode(&raw) {
            Ok(data) => data,
            Err(DecodeError::Corrupt(reason)) => {
                debug!(%reason, "discarding malformed session cookie");
                self.create(None, None);
                return Ok(());
            }
            Err(DecodeError::Fault(message)) => {
                warn!(%message, "session cookie decode fault, clearing cookie");
                // Clear it so the client does not resend the same value.
                let attributes = self.config.cookie.clone();
                self.ctx.set_cookie(&self.config.key, "", &attributes);
                return Err(Error::DecodeFault {
                    message,
                    set_cookie: self.ctx.staged_set_cookies(),
                });
            }
        };

        if !self.is_valid(Some(&data)) {
            self.create(None, None);
            return Ok(());
        }

        self.create(Some(data), None);
        self.record_fingerprint();
        Ok(())
    }

    /// Whether loaded data is usable as this request's session.
    pub fn is_valid(&self, data: Option<&SessionData>) -> bool {
        self.validator
            .is_valid(&self.ctx, data, self.config.now_ms())
    }

    /// Make `data` (or an empty session) the active session. With a store,
    /// `external_key` is kept or a new key is generated.
    pub fn create(&mut self, data: Option<SessionData>, external_key: Option<String>) {
        debug!(has_data = data.is_some(), ?external_key, "create session");
        if self.store.is_some() {
            self.external_key = Some(external_key.unwrap_or_else(|| self.config.generate_id()));
        }
        let session = match data {
            Some(data) => Session::from_data(data),
            None => Session::new(),
        };
        self.slot = SessionSlot::Active(session);
    }

    /// Drop the current session and start a fresh one under a new key.
    pub async fn regenerate(&mut self) -> Result<()> {
        debug!("regenerate session");
        self.remove().await?;
        self.external_key = None;
        self.prev_hash = None;
        self.create(None, None);
        Ok(())
    }

    /// Persist, remove, or leave the session, once per request.
    pub async fn commit(&mut self) -> Result<CommitOutcome> {
        let now = self.config.now_ms();
        let renew_due = self.renew_due(now);

        let changed = match &mut self.slot {
            SessionSlot::Unresolved => return Ok(CommitOutcome::Untouched),
            SessionSlot::Unset => {
                self.remove().await?;
                return Ok(CommitOutcome::Removed);
            }
            SessionSlot::Active(session) => {
                let mut changed = true;
                if !session.requires_save() {
                    let json = session.to_json();
                    if self.prev_hash.is_none() && json.is_empty() {
                        debug!("skip commit, new session never populated");
                        return Ok(CommitOutcome::Skipped(SkipReason::EmptyNew));
                    }
                    changed = self.prev_hash.as_deref() != Some(fingerprint(&json).as_str());
                    if !changed && !self.config.rolling && !renew_due {
                        debug!("skip commit, session unchanged");
                        return Ok(CommitOutcome::Skipped(SkipReason::Unchanged));
                    }
                }

                if let Some(hook) = self.config.before_save() {
                    debug!("before save");
                    hook(&self.ctx, session);
                }
                changed
            }
        };

        self.save(changed).await?;
        Ok(CommitOutcome::Saved { changed })
    }

    fn record_fingerprint(&mut self) {
        if let SessionSlot::Active(session) = &self.slot {
            self.prev_hash = Some(fingerprint(&session.to_json()));
        }
    }

    fn effective_max_age(&self, session: &Session) -> MaxAge {
        session.max_age().unwrap_or(self.config.max_age)
    }

    /// A loaded session with less than half its lifetime left.
    fn renew_due(&self, now: i64) -> bool {
        if !self.config.renew {
            return false;
        }
        let SessionSlot::Active(session) = &self.slot else {
            return false;
        };
        match (session.expire(), self.effective_max_age(session).as_millis()) {
            (Some(expire), Some(max_age)) => expire - now < (max_age / 2) as i64,
            _ => false,
        }
    }

    async fn save(&mut self, changed: bool) -> Result<()> {
        let SessionSlot::Active(session) = &self.slot else {
            return Ok(());
        };
        let max_age = self.effective_max_age(session);
        let mut json = session.to_json();
        let mut attributes: CookieAttributes = self.config.cookie.clone();

        match max_age {
            // No expiry stamp and no cookie lifetime: the cookie lives
            // until the browser session ends. The marker keeps it that way
            // on the next load.
            MaxAge::Session => {
                json.insert(SESSION_FIELD.to_string(), Value::Bool(true));
                attributes.max_age = None;
            }
            MaxAge::Millis(ms) => {
                let expire = self
                    .config
                    .now_ms()
                    .saturating_add(i64::try_from(ms).unwrap_or(i64::MAX));
                json.insert(EXPIRE_FIELD.to_string(), Value::from(expire));
                json.insert(MAX_AGE_FIELD.to_string(), Value::from(ms));
                attributes.max_age = Some(ms);
            }
        }

        if let (Some(store), Some(external_key)) = (&self.store, &self.external_key) {
            debug!(%external_key, changed, "save session to external store");
            let options = SetOptions {
                changed,
                rolling: self.config.rolling,
            };
            store.set(external_key, &json, max_age, options).await?;
            self.ctx.set_cookie(&self.config.key, external_key, &attributes);
            return Ok(());
        }

        debug!(changed, "save session to cookie");
        let encoded = self.config.codec().encode(&json)?;
        self.ctx.set_cookie(&self.config.key, &encoded, &attributes);
        Ok(())
    }

    async fn remove(&mut self) -> Result<()> {
        if let (Some(store), Some(external_key)) = (&self.store, &self.external_key) {
            debug!(%external_key, "destroy session in external store");
            store.destroy(external_key).await?;
        }
        let attributes = self.config.cookie.clone();
        self.ctx.set_cookie(&self.config.key, "", &attributes);
        Ok(())
    }
}

impl<C: RequestContext + std::fmt::Debug> std::fmt::Debug for SessionContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("ctx", &self.ctx)
            .field("slot", &self.slot)
            .field("external_key", &self.external_key)
            .field("prev_hash", &self.prev_hash)
            .finish_non_exhaustive()
    }
}
