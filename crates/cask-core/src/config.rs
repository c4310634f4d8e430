//! Session configuration.
//!
//! Built once per application and shared by every request's controller:
//!
//! ```rust,ignore
//! let config = SessionConfig::new()
//!     .with_key("app.sess")
//!     .with_max_age(MaxAge::Millis(60 * 60 * 1000))
//!     .with_rolling(true)
//!     .with_store(Arc::new(MemoryStore::new()));
//! ```

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::codec::{Base64JsonCodec, SessionCodec};
use crate::error::{Error, Result};
use crate::session::{Session, SessionData, ValidFn};
use crate::store::SessionStore;
use crate::transport::{CookieAttributes, RequestContext};

/// Default cookie name
pub const DEFAULT_KEY: &str = "cask.sess";

/// Session lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAge {
    /// Fixed lifetime in milliseconds
    Millis(u64),
    /// Until the browser session ends; no expiry is stamped
    Session,
}

impl MaxAge {
    pub const ONE_DAY: MaxAge = MaxAge::Millis(24 * 60 * 60 * 1000);

    pub fn as_millis(&self) -> Option<u64> {
        match self {
            MaxAge::Millis(ms) => Some(*ms),
            MaxAge::Session => None,
        }
    }
}

impl Default for MaxAge {
    fn default() -> Self {
        Self::ONE_DAY
    }
}

/// ExternalKey generator
pub type GenIdFn = dyn Fn() -> String + Send + Sync;

/// Hook run right before a session is persisted
pub type BeforeSaveFn = dyn Fn(&dyn RequestContext, &mut Session) + Send + Sync;

/// Builds a store bound to one request
pub type StoreFactory = dyn Fn(&dyn RequestContext) -> Arc<dyn SessionStore> + Send + Sync;

/// Where the external store comes from
#[derive(Clone)]
pub enum StoreSource {
    /// One store shared by all requests
    Shared(Arc<dyn SessionStore>),
    /// A store constructed per request
    PerRequest(Arc<StoreFactory>),
}

impl StoreSource {
    pub fn resolve(&self, ctx: &dyn RequestContext) -> Arc<dyn SessionStore> {
        match self {
            StoreSource::Shared(store) => Arc::clone(store),
            StoreSource::PerRequest(factory) => factory(ctx),
        }
    }
}

/// Session options
#[derive(Clone)]
pub struct SessionConfig {
    /// Cookie name
    pub key: String,
    /// Default session lifetime (default: one day)
    pub max_age: MaxAge,
    /// Persist on every request, even when unchanged (default: false)
    pub rolling: bool,
    /// Persist unchanged sessions when less than half their lifetime
    /// remains (default: false)
    pub renew: bool,
    /// Commit at the end of each request (default: true)
    pub auto_commit: bool,
    /// Attributes for the session cookie; `max_age` is filled in at save
    pub cookie: CookieAttributes,
    genid: Arc<GenIdFn>,
    valid: Option<Arc<ValidFn>>,
    before_save: Option<Arc<BeforeSaveFn>>,
    codec: Arc<dyn SessionCodec>,
    store: Option<StoreSource>,
    clock: Arc<dyn Clock>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            max_age: MaxAge::default(),
            rolling: false,
            renew: false,
            auto_commit: true,
            cookie: CookieAttributes::default(),
            genid: Arc::new(|| uuid::Uuid::new_v4().to_string()),
            valid: None,
            before_save: None,
            codec: Arc::new(Base64JsonCodec),
            store: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_max_age(mut self, max_age: MaxAge) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    pub fn with_renew(mut self, renew: bool) -> Self {
        self.renew = renew;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn with_cookie_attributes(mut self, cookie: CookieAttributes) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_genid<F>(mut self, genid: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.genid = Arc::new(genid);
        self
    }

    pub fn with_valid<F>(mut self, valid: F) -> Self
    where
        F: Fn(&dyn RequestContext, &SessionData) -> bool + Send + Sync + 'static,
    {
        self.valid = Some(Arc::new(valid));
        self
    }

    pub fn with_before_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn RequestContext, &mut Session) + Send + Sync + 'static,
    {
        self.before_save = Some(Arc::new(hook));
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Keep session data in an external store shared by all requests.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(StoreSource::Shared(store));
        self
    }

    /// Construct the external store per request.
    pub fn with_store_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&dyn RequestContext) -> Arc<dyn SessionStore> + Send + Sync + 'static,
    {
        self.store = Some(StoreSource::PerRequest(Arc::new(factory)));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check option combinations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(Error::config("session cookie key must not be empty"));
        }
        if let MaxAge::Millis(ms) = self.max_age {
            if ms == 0 || ms > i64::MAX as u64 {
                return Err(Error::config(
                    "max_age must be positive and fit in i64 milliseconds \
                     (use MaxAge::Session for browser-session cookies)",
                ));
            }
        }
        Ok(())
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&StoreSource> {
        self.store.as_ref()
    }

    pub fn generate_id(&self) -> String {
        (self.genid)()
    }

    pub fn valid(&self) -> Option<Arc<ValidFn>> {
        self.valid.clone()
    }

    pub fn before_save(&self) -> Option<&BeforeSaveFn> {
        self.before_save.as_deref()
    }

    pub fn codec(&self) -> &dyn SessionCodec {
        self.codec.as_ref()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("key", &self.key)
            .field("max_age", &self.max_age)
            .field("rolling", &self.rolling)
            .field("renew", &self.renew)
            .field("auto_commit", &self.auto_commit)
            .field("cookie", &self.cookie)
            .field("valid", &self.valid.is_some())
            .field("before_save", &self.before_save.is_some())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
