//! Request context contract.
//!
//! The controller never touches HTTP directly. It reads and stages cookies
//! through a [`RequestContext`], which the web layer implements over its own
//! request/response types.

use std::collections::HashMap;
use std::fmt;

/// `SameSite` cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// Attributes applied when the session cookie is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    /// Lifetime in milliseconds; `None` produces a browser-session cookie.
    pub max_age: Option<u64>,
    pub path: String,
    pub domain: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            max_age: None,
            path: "/".to_string(),
            domain: None,
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

/// The request the controller is bound to.
///
/// Writing an empty value must clear the cookie on the client. A later
/// write for the same name replaces an earlier staged one.
pub trait RequestContext: Send + Sync {
    /// Value of the named request cookie.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Stage a cookie on the response.
    fn set_cookie(&mut self, name: &str, value: &str, attributes: &CookieAttributes);

    /// Every `Set-Cookie` header value staged on the response so far.
    fn staged_set_cookies(&self) -> Vec<String>;
}

/// A cookie staged on a [`MemoryCookies`] context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCookie {
    pub name: String,
    pub value: String,
    pub attributes: CookieAttributes,
}

impl fmt::Display for StagedCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.attributes.path)?;
        if self.value.is_empty() {
            write!(f, "; Max-Age=0")?;
        } else if let Some(ms) = self.attributes.max_age {
            write!(f, "; Max-Age={}", ms / 1000)?;
        }
        if self.attributes.http_only {
            write!(f, "; HttpOnly")?;
        }
        Ok(())
    }
}

/// In-memory request context, for tests and non-HTTP embeddings.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookies {
    incoming: HashMap<String, String>,
    staged: Vec<StagedCookie>,
}

impl MemoryCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.incoming.insert(name.into(), value.into());
        self
    }

    /// Cookies staged on the response, in write order.
    pub fn staged(&self) -> &[StagedCookie] {
        &self.staged
    }

    /// The staged cookie with the given name, if any.
    pub fn staged_cookie(&self, name: &str) -> Option<&StagedCookie> {
        self.staged.iter().find(|c| c.name == name)
    }

    /// Turn staged cookies into the next request's cookies.
    pub fn next_request(&self) -> Self {
        let mut next = Self::new();
        for cookie in &self.staged {
            if !cookie.value.is_empty() {
                next.incoming.insert(cookie.name.clone(), cookie.value.clone());
            }
        }
        for (name, value) in &self.incoming {
            if self.staged_cookie(name).is_none() {
                next.incoming.insert(name.clone(), value.clone());
            }
        }
        next
    }
}

impl RequestContext for MemoryCookies {
    fn cookie(&self, name: &str) -> Option<String> {
        self.incoming.get(name).cloned()
    }

    fn set_cookie(&mut self, name: &str, value: &str, attributes: &CookieAttributes) {
        self.staged.retain(|c| c.name != name);
        self.staged.push(StagedCookie {
            name: name.to_string(),
            value: value.to_string(),
            attributes: attributes.clone(),
        });
    }

    fn staged_set_cookies(&self) -> Vec<String> {
        self.staged.iter().map(ToString::to_string).collect()
    }
}
