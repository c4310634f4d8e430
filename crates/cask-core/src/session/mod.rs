//! Session state container.
//!
//! A [`Session`] is the application-visible view of one session's data:
//! a JSON object keyed by strings. Fields starting with `_` are reserved for
//! the lifecycle controller and never appear in [`Session::to_json`].
//!
//! ```text
//! cookie / store payload                 Session
//! ┌──────────────────────────┐           ┌──────────────────────┐
//! │ { "user": 1,             │  load     │ data:    { user: 1 } │
//! │   "_expire": 1700000..., │ ───────►  │ expire:  Some(..)    │
//! │   "_maxAge": 86400000 }  │           │ max_age: Some(..)    │
//! └──────────────────────────┘           └──────────────────────┘
//! ```

mod fingerprint;
mod validity;

pub use fingerprint::fingerprint;
pub use validity::{ValidFn, Validator};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::config::MaxAge;
use crate::error::Result;

/// Raw session data as carried by cookies and stores.
pub type SessionData = Map<String, Value>;

/// Reserved field holding the absolute expiry (epoch ms).
pub const EXPIRE_FIELD: &str = "_expire";

/// Reserved field holding the max-age (ms) used to compute `_expire`.
pub const MAX_AGE_FIELD: &str = "_maxAge";

/// Reserved marker for sessions that last until the browser closes.
pub const SESSION_FIELD: &str = "_session";

fn is_reserved(key: &str) -> bool {
    key.starts_with('_')
}

/// One request's session data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    data: SessionData,
    is_new: bool,
    force_save: bool,
    max_age: Option<MaxAge>,
    expire: Option<i64>,
}

impl Session {
    /// Create an empty, never-persisted session.
    pub fn new() -> Self {
        Self {
            is_new: true,
            ..Default::default()
        }
    }

    /// Restore a session from a decoded payload.
    ///
    /// Reserved fields are lifted out of the data: `_maxAge` (or the
    /// `_session` marker) becomes the per-session max-age and `_expire` the
    /// loaded expiry. A `_maxAge` outside `1..=i64::MAX` is ignored.
    pub fn from_data(data: SessionData) -> Self {
        let mut session = Self::default();
        for (key, value) in data {
            match key.as_str() {
                MAX_AGE_FIELD => {
                    session.max_age = value
                        .as_u64()
                        .filter(|ms| (1..=i64::MAX as u64).contains(ms))
                        .map(MaxAge::Millis);
                }
                SESSION_FIELD => {
                    if value.as_bool() == Some(true) {
                        session.max_age = Some(MaxAge::Session);
                    }
                }
                EXPIRE_FIELD => session.expire = as_millis(&value),
                k if is_reserved(k) => {}
                _ => {
                    session.data.insert(key, value);
                }
            }
        }
        session
    }

    /// Get a value deserialized into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value for a key.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Insert any serializable value.
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.insert_value(key, value);
        Ok(())
    }

    /// Insert a raw JSON value.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Number of application keys.
    pub fn len(&self) -> usize {
        self.data.keys().filter(|k| !is_reserved(k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the session holds any application data.
    pub fn populated(&self) -> bool {
        !self.is_empty()
    }

    /// True when the session was created without prior data.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Force persistence at commit even if nothing changed.
    pub fn force_save(&mut self) {
        self.force_save = true;
    }

    pub fn requires_save(&self) -> bool {
        self.force_save
    }

    /// Per-session max-age override, if any.
    pub fn max_age(&self) -> Option<MaxAge> {
        self.max_age
    }

    /// Override the configured max-age for this session only.
    pub fn set_max_age(&mut self, max_age: MaxAge) {
        self.max_age = Some(max_age);
    }

    /// Expiry (epoch ms) carried by the loaded payload.
    pub fn expire(&self) -> Option<i64> {
        self.expire
    }

    /// Application data without reserved fields.
    pub fn to_json(&self) -> SessionData {
        self.data
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Read a timestamp that may have been written as an integer or a float.
pub(crate) fn as_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> SessionData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new();
        assert!(session.is_new());
        assert!(session.is_empty());
        assert!(!session.populated());
        assert!(!session.requires_save());
        assert!(session.to_json().is_empty());
    }

    #[test]
    fn test_from_data_lifts_reserved_fields() {
        let session = Session::from_data(data(json!({
            "user": "u-1",
            "_expire": 1_700_000_000_000i64,
            "_maxAge": 5000,
            "_internal": true,
        })));

        assert!(!session.is_new());
        assert_eq!(session.len(), 1);
        assert_eq!(session.get::<String>("user").as_deref(), Some("u-1"));
        assert_eq!(session.expire(), Some(1_700_000_000_000));
        assert_eq!(session.max_age(), Some(MaxAge::Millis(5000)));
        assert!(!session.to_json().contains_key("_expire"));
        assert!(!session.to_json().contains_key("_internal"));
    }

    #[test]
    fn test_session_marker_restores_browser_session() {
        let session = Session::from_data(data(json!({ "user": 1, "_session": true })));
        assert_eq!(session.max_age(), Some(MaxAge::Session));
        assert!(!session.to_json().contains_key("_session"));

        let session = Session::from_data(data(json!({ "_session": false })));
        assert_eq!(session.max_age(), None);
    }

    #[test]
    fn test_out_of_range_max_age_is_ignored() {
        for max_age in [json!(0), json!(u64::MAX), json!(-5), json!("1000")] {
            let session = Session::from_data(data(json!({ "_maxAge": max_age })));
            assert_eq!(session.max_age(), None);
        }

        let session = Session::from_data(data(json!({ "_maxAge": i64::MAX })));
        assert_eq!(session.max_age(), Some(MaxAge::Millis(i64::MAX as u64)));
    }

    #[test]
    fn test_float_expire_is_accepted() {
        let session = Session::from_data(data(json!({ "_expire": 1234.0 })));
        assert_eq!(session.expire(), Some(1234));
    }

    #[test]
    fn test_insert_get_remove() {
        let mut session = Session::new();
        session.insert("views", 3).unwrap();
        session.insert("tags", vec!["a", "b"]).unwrap();

        assert_eq!(session.get::<i64>("views"), Some(3));
        assert_eq!(session.get::<Vec<String>>("tags").unwrap(), vec!["a", "b"]);
        assert_eq!(session.get::<String>("views"), None);
        assert!(session.populated());

        assert_eq!(session.remove("views"), Some(json!(3)));
        assert!(!session.contains_key("views"));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_reserved_keys_are_hidden() {
        let mut session = Session::new();
        session.insert_value("_shadow", json!(1));
        assert!(session.is_empty());
        assert!(session.to_json().is_empty());
    }

    #[test]
    fn test_force_save_and_max_age() {
        let mut session = Session::new();
        session.force_save();
        session.set_max_age(MaxAge::Session);
        assert!(session.requires_save());
        assert_eq!(session.max_age(), Some(MaxAge::Session));
    }
}
