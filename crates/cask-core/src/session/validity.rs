//! Validity checks for loaded session data.

use std::sync::Arc;
use tracing::debug;

use super::{as_millis, SessionData, EXPIRE_FIELD};
use crate::transport::RequestContext;

/// Caller-supplied revocation predicate. Returning `false` discards the
/// session (e.g. the user it belongs to was deleted).
pub type ValidFn = dyn Fn(&dyn RequestContext, &SessionData) -> bool + Send + Sync;

/// Decides whether loaded data can be used as the request's session.
#[derive(Clone, Default)]
pub struct Validator {
    predicate: Option<Arc<ValidFn>>,
}

impl Validator {
    pub fn new(predicate: Option<Arc<ValidFn>>) -> Self {
        Self { predicate }
    }

    pub fn with_predicate<F>(predicate: F) -> Self
    where
        F: Fn(&dyn RequestContext, &SessionData) -> bool + Send + Sync + 'static,
    {
        Self::new(Some(Arc::new(predicate)))
    }

    /// Absent data, an `_expire` in the past, or a rejecting predicate all
    /// make the data invalid.
    pub fn is_valid(
        &self,
        ctx: &dyn RequestContext,
        data: Option<&SessionData>,
        now_ms: i64,
    ) -> bool {
        let Some(data) = data else {
            return false;
        };

        if let Some(expire) = data.get(EXPIRE_FIELD).and_then(as_millis) {
            if expire < now_ms {
                debug!(expire, now_ms, "expired session");
                return false;
            }
        }

        if let Some(predicate) = &self.predicate {
            if !predicate(ctx, data) {
                debug!("invalid session");
                return false;
            }
        }

        true
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryCookies;
    use serde_json::{json, Value};

    fn data(value: Value) -> SessionData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_absent_data_is_invalid() {
        let ctx = MemoryCookies::new();
        assert!(!Validator::default().is_valid(&ctx, None, 0));
    }

    #[test]
    fn test_expiry() {
        let ctx = MemoryCookies::new();
        let validator = Validator::default();
        let payload = data(json!({ "user": 1, "_expire": 2000 }));

        assert!(validator.is_valid(&ctx, Some(&payload), 1999));
        assert!(validator.is_valid(&ctx, Some(&payload), 2000));
        assert!(!validator.is_valid(&ctx, Some(&payload), 2001));
    }

    #[test]
    fn test_missing_expire_is_valid() {
        let ctx = MemoryCookies::new();
        let payload = data(json!({ "user": 1 }));
        assert!(Validator::default().is_valid(&ctx, Some(&payload), i64::MAX));
    }

    #[test]
    fn test_predicate_rejects() {
        let ctx = MemoryCookies::new().with_cookie("tenant", "blocked");
        let validator = Validator::with_predicate(|ctx, data| {
            ctx.cookie("tenant").as_deref() != Some("blocked") && data.contains_key("user")
        });

        let with_user = data(json!({ "user": 1 }));
        assert!(!validator.is_valid(&ctx, Some(&with_user), 0));

        let open = MemoryCookies::new();
        assert!(validator.is_valid(&open, Some(&with_user), 0));
        assert!(!validator.is_valid(&open, Some(&data(json!({}))), 0));
    }

    #[test]
    fn test_expiry_checked_before_predicate() {
        let ctx = MemoryCookies::new();
        let validator = Validator::with_predicate(|_, _| -> bool {
            panic!("predicate must not run for expired data")
        });
        let payload = data(json!({ "_expire": 10 }));
        assert!(!validator.is_valid(&ctx, Some(&payload), 11));
    }
}
