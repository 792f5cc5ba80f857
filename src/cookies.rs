//! domain and path scoped cookie persistence for a session.

use std::collections::HashMap;

use cookie::{Cookie, Expiration, time::OffsetDateTime};
use http::header::HeaderValue;
use tracing::debug;

/// In memory cookie table shared by all requests of one session.
///
/// Cookies are keyed by (domain, path, name). Storing a cookie with a key
/// already present overwrites it. Expired cookies are dropped lazily when
/// they are read.
pub struct CookieStore {
    cookies: HashMap<StoreKey, StoredCookie>,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct StoreKey {
    domain: String,
    path: String,
    name: String,
}

struct StoredCookie {
    cookie: Cookie<'static>,
    // set when the cookie carried no Domain attribute. such a cookie applies
    // to the exact host that set it, excluding subdomains.
    host_only: bool,
    expires: Option<OffsetDateTime>,
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStore {
    pub fn new() -> Self {
        Self { cookies: HashMap::new() }
    }

    /// Store one cookie as if set by a response from `host` for a request to
    /// `request_path`. A cookie already expired at store time deletes any
    /// stored cookie with the same key.
    pub fn add(&mut self, cookie: Cookie<'_>, host: &str, request_path: &str) {
        let host = host.to_ascii_lowercase();

        let (domain, host_only) = match cookie.domain() {
            Some(domain) => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                // a Domain attribute not covering the host that set the cookie
                // is rejected.
                if !domain_match(&host, &domain) {
                    debug!("cookie domain {domain} rejected for response from {host}");
                    return;
                }
                (domain, false)
            }
            None => (host, true),
        };

        let path = match cookie.path() {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => default_path(request_path),
        };

        let expires = match (cookie.max_age(), cookie.expires()) {
            // Max-Age wins over Expires when both are present.
            (Some(max_age), _) => Some(OffsetDateTime::now_utc() + max_age),
            (None, Some(Expiration::DateTime(at))) => Some(at),
            _ => None,
        };

        let key = StoreKey {
            domain,
            path,
            name: cookie.name().to_string(),
        };

        match expires {
            Some(at) if at <= OffsetDateTime::now_utc() => {
                // expiry in the past is the wire level cookie deletion.
                self.cookies.remove(&key);
            }
            expires => {
                self.cookies.insert(
                    key,
                    StoredCookie {
                        cookie: cookie.into_owned(),
                        host_only,
                        expires,
                    },
                );
            }
        }
    }

    /// Parse and store `Set-Cookie` response header values received from
    /// `host` for a request to `request_path`. Malformed values are skipped.
    pub(crate) fn update<'h>(
        &mut self,
        set_cookie_headers: impl Iterator<Item = &'h HeaderValue>,
        host: &str,
        request_path: &str,
    ) {
        for value in set_cookie_headers {
            let Ok(value) = value.to_str() else {
                continue;
            };

            match Cookie::parse_encoded(value) {
                Ok(cookie) => self.add(cookie, host, request_path),
                Err(e) => debug!("ignoring malformed set-cookie header: {e}"),
            }
        }
    }

    /// Cookies applicable to a request, longest path first. Purges expired
    /// entries on the way.
    pub(crate) fn applicable(&mut self, host: &str, path: &str, secure_channel: bool) -> Vec<(String, String)> {
        let host = host.to_ascii_lowercase();
        let now = OffsetDateTime::now_utc();

        self.cookies.retain(|_, stored| match stored.expires {
            Some(at) => at > now,
            None => true,
        });

        let mut matched = self
            .cookies
            .iter()
            .filter(|(key, stored)| {
                let domain_ok = if stored.host_only {
                    host == key.domain
                } else {
                    domain_match(&host, &key.domain)
                };

                domain_ok && path_match(path, &key.path) && (secure_channel || !stored.cookie.secure().unwrap_or(false))
            })
            .collect::<Vec<_>>();

        matched.sort_by(|(a, _), (b, _)| b.path.len().cmp(&a.path.len()).then_with(|| a.name.cmp(&b.name)));

        matched
            .into_iter()
            .map(|(_, stored)| (stored.cookie.name().to_string(), stored.cookie.value().to_string()))
            .collect()
    }

    /// `Cookie` request header value for a request, or `None` when no stored
    /// cookie applies.
    pub(crate) fn cookie_header(&mut self, host: &str, path: &str, secure_channel: bool) -> Option<HeaderValue> {
        let cookies = self.applicable(host, path, secure_channel);

        if cookies.is_empty() {
            return None;
        }

        let header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        HeaderValue::try_from(header).ok()
    }

    /// Look up a stored cookie by its exact (domain, path, name) key.
    pub fn get(&self, domain: &str, path: &str, name: &str) -> Option<&Cookie<'static>> {
        let key = StoreKey {
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            path: path.to_string(),
            name: name.to_string(),
        };
        self.cookies.get(&key).map(|stored| &stored.cookie)
    }

    /// Iterate all stored cookies, expired ones included. Callers wanting to
    /// persist a session's cookies can serialize from here.
    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.values().map(|stored| &stored.cookie)
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }
}

// suffix matching rule without public suffix awareness: a cookie domain
// covers the host itself and any of its subdomains.
fn domain_match(host: &str, domain: &str) -> bool {
    host == domain || (host.len() > domain.len() && host.ends_with(domain) && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/') || request_path.as_bytes()[cookie_path.len()] == b'/'))
}

// RFC 6265 default-path of the request uri: up to but excluding the last '/'.
fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }

    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

#[cfg(test)]
mod test {
    use cookie::time::Duration;

    use super::*;

    fn names(cookies: Vec<(String, String)>) -> Vec<String> {
        cookies.into_iter().map(|(name, _)| name).collect()
    }

    #[test]
    fn host_only_excludes_other_hosts() {
        let mut store = CookieStore::new();

        // no Domain attribute. the cookie sticks to the exact host.
        store.add(Cookie::parse("id=1").unwrap(), "a.example.com", "/");

        assert_eq!(names(store.applicable("a.example.com", "/", false)), ["id"]);
        assert!(store.applicable("example.com", "/", false).is_empty());
        assert!(store.applicable("b.a.example.com", "/", false).is_empty());
    }

    #[test]
    fn domain_cookie_covers_subdomains() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("id=1; Domain=example.com").unwrap(), "example.com", "/");

        assert_eq!(names(store.applicable("example.com", "/", false)), ["id"]);
        assert_eq!(names(store.applicable("sub.example.com", "/", false)), ["id"]);
        // suffix match requires a label boundary.
        assert!(store.applicable("notexample.com", "/", false).is_empty());
    }

    #[test]
    fn foreign_domain_rejected() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("id=1; Domain=other.com").unwrap(), "example.com", "/");

        assert!(store.applicable("other.com", "/", false).is_empty());
        assert!(store.applicable("example.com", "/", false).is_empty());
    }

    #[test]
    fn expired_absent_from_applicable() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("keep=1; Max-Age=3600").unwrap(), "example.com", "/");

        let mut dead = Cookie::new("dead", "1");
        dead.set_expires(OffsetDateTime::now_utc() - Duration::hours(1));
        store.add(dead, "example.com", "/");

        assert_eq!(names(store.applicable("example.com", "/", false)), ["keep"]);
    }

    #[test]
    fn max_age_zero_deletes() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("id=1").unwrap(), "example.com", "/");
        assert_eq!(store.len(), 1);

        store.add(Cookie::parse("id=; Max-Age=0").unwrap(), "example.com", "/");
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn same_key_overwrites() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("id=1").unwrap(), "example.com", "/");
        store.add(Cookie::parse("id=2").unwrap(), "example.com", "/");

        assert_eq!(store.len(), 1);
        assert_eq!(store.applicable("example.com", "/", false)[0].1, "2");
    }

    #[test]
    fn longest_path_first() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("a=1; Path=/").unwrap(), "example.com", "/");
        store.add(Cookie::parse("b=2; Path=/deep/nested").unwrap(), "example.com", "/");
        store.add(Cookie::parse("c=3; Path=/deep").unwrap(), "example.com", "/");

        assert_eq!(names(store.applicable("example.com", "/deep/nested/leaf", false)), ["b", "c", "a"]);
        assert_eq!(names(store.applicable("example.com", "/deep", false)), ["c", "a"]);
        // path prefix match requires a segment boundary.
        assert!(!names(store.applicable("example.com", "/deeper", false)).contains(&"c".to_string()));
    }

    #[test]
    fn secure_requires_tls() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("id=1; Secure").unwrap(), "example.com", "/");

        assert!(store.applicable("example.com", "/", false).is_empty());
        assert_eq!(names(store.applicable("example.com", "/", true)), ["id"]);
    }

    #[test]
    fn default_path_from_request() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("id=1").unwrap(), "example.com", "/account/settings");

        // default path is the parent of the request path.
        assert_eq!(names(store.applicable("example.com", "/account", false)), ["id"]);
        assert_eq!(names(store.applicable("example.com", "/account/billing", false)), ["id"]);
        assert!(store.applicable("example.com", "/other", false).is_empty());
    }

    #[test]
    fn header_value_joined() {
        let mut store = CookieStore::new();

        store.add(Cookie::parse("a=1").unwrap(), "example.com", "/");
        store.add(Cookie::parse("b=2").unwrap(), "example.com", "/");

        let header = store.cookie_header("example.com", "/", false).unwrap();
        assert_eq!(header.to_str().unwrap(), "a=1; b=2");

        assert!(store.cookie_header("other.com", "/", false).is_none());
    }
}
