//! Per-site cookie jar.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::transport::HttpResponse;

/// Session cookie set by a successful login.
pub const AUTH_COOKIE: &str = "__ac";
/// Clipboard cookie set by `object_copy` / `object_cut`.
pub const CLIPBOARD_COOKIE: &str = "__cp";

/// Name → value cookie store. Serializable so hosts can persist sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cookies.remove(name)
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Apply every `Set-Cookie` header of a response.
    ///
    /// Returns the names that were set (not removed).
    pub fn absorb(&mut self, response: &HttpResponse) -> Vec<String> {
        let mut set = Vec::new();
        for header in response.header_values("set-cookie") {
            let Some((name, value, expired)) = parse_set_cookie(header) else {
                continue;
            };
            if expired || matches!(value.as_str(), "" | "\"\"" | "deleted") {
                self.cookies.remove(&name);
            } else {
                self.cookies.insert(name.clone(), value);
                set.push(name);
            }
        }
        set
    }

    /// `Cookie:` header value, or None when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Parse `name=value; attr; attr=x` into (name, value, expired).
///
/// The value is kept as sent, quotes included: the CMS quotes `__ac` and
/// only accepts it back in that form.
fn parse_set_cookie(header: &str) -> Option<(String, String, bool)> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim();
    let expired = parts.any(|attr| {
        let attr = attr.trim();
        attr.eq_ignore_ascii_case("max-age=0") || attr.eq_ignore_ascii_case("max-age=-1")
    });
    Some((name.to_string(), value.to_string(), expired))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_and_header() {
        let mut jar = CookieJar::new();
        let response = HttpResponse::new(302)
            .with_header("set-cookie", "__ac=\"abc123\"; Path=/; HttpOnly")
            .with_header("set-cookie", "I18N_LANGUAGE=en; Path=/");
        let set = jar.absorb(&response);
        assert_eq!(set, vec!["__ac".to_string(), "I18N_LANGUAGE".to_string()]);
        assert_eq!(jar.get(AUTH_COOKIE), Some("\"abc123\""));
        assert_eq!(
            jar.header_value().as_deref(),
            Some("I18N_LANGUAGE=en; __ac=\"abc123\"")
        );
    }

    #[test]
    fn test_quoted_empty_value_clears_cookie() {
        let mut jar = CookieJar::new();
        jar.insert(AUTH_COOKIE, "\"token\"");
        let response = HttpResponse::new(200).with_header("set-cookie", "__ac=\"\"; Path=/");
        assert!(jar.absorb(&response).is_empty());
        assert_eq!(jar.get(AUTH_COOKIE), None);
    }

    #[test]
    fn test_expired_cookie_is_removed() {
        let mut jar = CookieJar::new();
        jar.insert(CLIPBOARD_COOKIE, "old");
        let response =
            HttpResponse::new(200).with_header("set-cookie", "__cp=deleted; Path=/; Max-Age=0");
        assert!(jar.absorb(&response).is_empty());
        assert_eq!(jar.get(CLIPBOARD_COOKIE), None);
        assert_eq!(jar.header_value(), None);
    }

    #[test]
    fn test_jar_serializes() {
        let mut jar = CookieJar::new();
        jar.insert(AUTH_COOKIE, "token");
        let json = serde_json::to_string(&jar).unwrap();
        let restored: CookieJar = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, jar);
    }
}
