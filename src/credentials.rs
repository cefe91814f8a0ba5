//! Request credentials derived from a cookie snapshot.

use crate::config::CredentialDefaults;
use crate::cookies::{
    CookieJar, HALL_TICKET_COOKIE, IMEI_TICKET_COOKIE, SESSION_COOKIE, SOURCE_TYPE_TICKET_COOKIE,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Session credentials presented to the transaction endpoint
///
/// Values are secrets; `Debug` output redacts them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// `ASP.NET_SessionId` value, never empty
    pub session_id: String,
    /// Device ticket (`imeiticket`)
    pub imei_ticket: String,
    /// Source-type ticket, presented under the cookie name chosen by a [`CredentialShape`]
    pub source_type_ticket: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("session_id", &"<redacted>")
            .field("imei_ticket", &"<redacted>")
            .field("source_type_ticket", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Derive credentials from a cookie snapshot
    ///
    /// Fails with [`Error::CredentialMissing`] when no session cookie was
    /// captured. The ticket is taken from `hallticket`, then
    /// `sourcetypeticket`; missing tickets fall back to `defaults`.
    pub fn resolve(jar: &CookieJar, defaults: &CredentialDefaults) -> Result<Self> {
        let session_id = jar.get(SESSION_COOKIE).ok_or(Error::CredentialMissing {
            cookie: SESSION_COOKIE,
        })?;

        let source_type_ticket = match [HALL_TICKET_COOKIE, SOURCE_TYPE_TICKET_COOKIE]
            .into_iter()
            .find_map(|name| jar.get(name))
        {
            Some(ticket) => ticket.to_string(),
            None => {
                tracing::warn!(
                    "neither hallticket nor sourcetypeticket captured, using default ticket; queries may fail"
                );
                defaults.default_source_type_ticket.clone()
            }
        };

        let imei_ticket = match jar.get(IMEI_TICKET_COOKIE) {
            Some(ticket) => ticket.to_string(),
            None => {
                tracing::debug!("imeiticket not captured, using default device ticket");
                defaults.default_imei_ticket.clone()
            }
        };

        Ok(Self {
            session_id: session_id.to_string(),
            imei_ticket,
            source_type_ticket,
        })
    }
}

/// How the source-type ticket is presented to the portal
///
/// Deployments disagree on the cookie name; the probe tries each shape in
/// [`CredentialShape::PROBE_ORDER`] and keeps the first that works.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialShape {
    /// Ticket sent as the `sourcetypeticket` cookie
    Primary,
    /// Ticket sent as the `hallticket` cookie
    Fallback,
}

impl CredentialShape {
    /// Order in which shapes are probed
    pub const PROBE_ORDER: [CredentialShape; 2] =
        [CredentialShape::Primary, CredentialShape::Fallback];

    /// Cookie name carrying the source-type ticket in this shape
    pub fn ticket_cookie(&self) -> &'static str {
        match self {
            CredentialShape::Primary => SOURCE_TYPE_TICKET_COOKIE,
            CredentialShape::Fallback => HALL_TICKET_COOKIE,
        }
    }

    /// Cookie name/value pairs for a request made with this shape
    pub fn cookie_pairs<'a>(&self, credentials: &'a Credentials) -> [(&'static str, &'a str); 3] {
        [
            (SESSION_COOKIE, credentials.session_id.as_str()),
            (IMEI_TICKET_COOKIE, credentials.imei_ticket.as_str()),
            (self.ticket_cookie(), credentials.source_type_ticket.as_str()),
        ]
    }

    /// `Cookie` header value for a request made with this shape
    pub fn cookie_header(&self, credentials: &Credentials) -> String {
        self.cookie_pairs(credentials)
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for CredentialShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ticket_cookie())
    }
}
