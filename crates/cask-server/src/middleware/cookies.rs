//! Cookie transport over HTTP headers.

use axum::http::{header, HeaderMap, HeaderValue};
use cask_core::transport::{CookieAttributes, RequestContext, SameSite};
use cookie::time::Duration;
use cookie::{Cookie, CookieJar};

/// Request cookies parsed from `Cookie`, response cookies staged as a jar
/// delta and flushed as `Set-Cookie` headers.
#[derive(Debug, Default, Clone)]
pub struct HeaderCookies {
    jar: CookieJar,
}

impl HeaderCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = CookieJar::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse_encoded(value.to_string()).flatten() {
                // The first of several same-named cookies wins.
                if jar.get(cookie.name()).is_none() {
                    jar.add_original(cookie.into_owned());
                }
            }
        }
        Self { jar }
    }

    /// Staged cookies as `Set-Cookie` header values
    pub fn set_cookie_headers(&self) -> Vec<HeaderValue> {
        self.staged_set_cookies()
            .into_iter()
            .filter_map(|value| HeaderValue::from_str(&value).ok())
            .collect()
    }
}

impl RequestContext for HeaderCookies {
    fn cookie(&self, name: &str) -> Option<String> {
        self.jar.get(name).map(|c| c.value().to_string())
    }

    fn set_cookie(&mut self, name: &str, value: &str, attributes: &CookieAttributes) {
        let same_site = match attributes.same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        };

        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .path(attributes.path.clone())
            .http_only(attributes.http_only)
            .secure(attributes.secure)
            .same_site(same_site);
        if let Some(domain) = &attributes.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(ms) = attributes.max_age {
            builder = builder.max_age(Duration::milliseconds(ms as i64));
        }

        let mut cookie = builder.build();
        if value.is_empty() {
            cookie.make_removal();
        }
        self.jar.add(cookie);
    }

    fn staged_set_cookies(&self) -> Vec<String> {
        self.jar
            .delta()
            .map(|cookie| cookie.encoded().to_string())
            .collect()
    }
}
