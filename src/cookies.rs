//! Cookie capture from the interactive browser session.
//!
//! The browser integration calls [`CookieCapture::record`] from its
//! cookie-added callback as the portal sets cookies. The core never polls the
//! capture; it takes one [`CookieJar`] snapshot when the user signals that the
//! login is complete and resolves credentials from that.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Session cookie set by the portal's ASP.NET backend
pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";
/// Ticket cookie name used by the hall (fallback) login flow
pub const HALL_TICKET_COOKIE: &str = "hallticket";
/// Ticket cookie name used by the source-type (primary) login flow
pub const SOURCE_TYPE_TICKET_COOKIE: &str = "sourcetypeticket";
/// Device ticket cookie
pub const IMEI_TICKET_COOKIE: &str = "imeiticket";

/// Immutable snapshot of captured cookies (name -> value)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar(HashMap<String, String>);

impl CookieJar {
    /// Create an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cookie
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a cookie value; empty values count as absent
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Number of cookies in the jar
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the jar holds no cookies
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cookie names, sorted (values are never exposed in bulk)
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<K, V> FromIterator<(K, V)> for CookieJar
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Shared, thread-safe cookie collector fed by the browser collaborator
///
/// Cheap to clone; every clone writes into the same map. Cookies only ever
/// get added or overwritten, so a snapshot is always a consistent view of
/// what the browser has seen so far.
#[derive(Clone, Debug)]
pub struct CookieCapture {
    target_domain: Arc<str>,
    cookies: Arc<RwLock<HashMap<String, String>>>,
}

impl CookieCapture {
    /// Create a capture that only accepts cookies for `target_domain`
    pub fn new(target_domain: impl AsRef<str>) -> Self {
        Self {
            target_domain: Arc::from(normalize_domain(target_domain.as_ref())),
            cookies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The domain this capture accepts
    pub fn target_domain(&self) -> &str {
        &self.target_domain
    }

    /// Record a cookie delivered by the browser
    ///
    /// Returns `false` (and stores nothing) when the cookie belongs to another
    /// domain. A leading dot on `domain` is ignored.
    pub fn record(&self, domain: &str, name: &str, value: &str) -> bool {
        if normalize_domain(domain) != &*self.target_domain {
            tracing::trace!(domain, name, "ignoring cookie for foreign domain");
            return false;
        }

        let mut cookies = self
            .cookies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cookies.insert(name.to_string(), value.to_string());
        tracing::debug!(name, "cookie captured");
        true
    }

    /// Number of cookies captured so far
    pub fn len(&self) -> usize {
        self.cookies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether nothing has been captured yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take an immutable snapshot for credential resolution
    pub fn snapshot(&self) -> CookieJar {
        let cookies = self
            .cookies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        CookieJar(cookies.clone())
    }
}

fn normalize_domain(domain: &str) -> &str {
    domain.trim().trim_start_matches('.')
}
