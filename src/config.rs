//! Configuration types for campus-ledger

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Portal base address used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://220.178.164.65:8053";

/// Cookie domain the capture handle accepts by default
pub const DEFAULT_TARGET_DOMAIN: &str = "220.178.164.65";

/// Device ticket substituted when the portal never set `imeiticket`
pub const DEFAULT_IMEI_TICKET: &str = "7b3672f7e9efc1603b65203bd471162c";

/// Source-type ticket substituted when neither ticket cookie was captured
pub const DEFAULT_SOURCE_TYPE_TICKET: &str = "2B5553C3C44E4B78BD25AEC09D8358D1";

/// Portal connection settings (addresses, headers, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal base URL, scheme and port included (default: "http://220.178.164.65:8053")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cookie domain accepted from the browser session (default: "220.178.164.65")
    #[serde(default = "default_target_domain")]
    pub target_domain: String,

    /// Budget for a single page request (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent presented to the portal (default: the mobile webview string the portal expects)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Language header value
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Referer path, relative to the base URL (default: "PPage/ComePage?flowID=15")
    #[serde(default = "default_referer_path")]
    pub referer_path: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            target_domain: default_target_domain(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            referer_path: default_referer_path(),
        }
    }
}

/// Fallback values used when resolving credentials from cookies
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialDefaults {
    /// Device ticket used when `imeiticket` is absent
    #[serde(default = "default_imei_ticket")]
    pub default_imei_ticket: String,

    /// Source-type ticket used when neither `hallticket` nor `sourcetypeticket` is present
    #[serde(default = "default_source_type_ticket")]
    pub default_source_type_ticket: String,

    /// Repeat the source-type ticket as the `sourcetype` form field (default: true)
    #[serde(default = "default_true")]
    pub send_source_type: bool,
}

impl Default for CredentialDefaults {
    fn default() -> Self {
        Self {
            default_imei_ticket: default_imei_ticket(),
            default_source_type_ticket: default_source_type_ticket(),
            send_source_type: true,
        }
    }
}

/// Retrieval run behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Pause between consecutive page requests (default: 500 ms)
    #[serde(default = "default_page_delay", with = "millis_serde")]
    pub page_delay: Duration,

    /// Page size assumed when the server's page size cannot be observed (default: 15)
    #[serde(default = "default_fallback_page_size")]
    pub fallback_page_size: usize,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            page_delay: default_page_delay(),
            fallback_page_size: default_fallback_page_size(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Main configuration for [`Retriever`](crate::Retriever)
///
/// Every field has a default, so `Config::default()` talks to the stock
/// portal deployment and an empty JSON object deserializes to the same thing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Portal address and request settings
    #[serde(default)]
    pub portal: PortalConfig,

    /// Credential fallback values
    #[serde(default)]
    pub credentials: CredentialDefaults,

    /// Run pacing and event delivery
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Check the configuration for values that would make every request fail
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.portal.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.portal.base_url, e),
            key: Some("portal.base_url".to_string()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base URL must be http or https, got '{}'", url.scheme()),
                key: Some("portal.base_url".to_string()),
            });
        }
        if self.portal.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request timeout must be greater than zero".to_string(),
                key: Some("portal.request_timeout".to_string()),
            });
        }
        if self.retrieval.event_buffer == 0 {
            return Err(Error::Config {
                message: "event buffer must hold at least one event".to_string(),
                key: Some("retrieval.event_buffer".to_string()),
            });
        }
        if self.retrieval.fallback_page_size == 0 {
            return Err(Error::Config {
                message: "fallback page size must be greater than zero".to_string(),
                key: Some("retrieval.fallback_page_size".to_string()),
            });
        }
        Ok(())
    }

    /// Load a configuration from a JSON file, filling missing fields with defaults
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_target_domain() -> String {
    DEFAULT_TARGET_DOMAIN.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Linux; Android 15; 23127PN0CC Build/AQ3A.240627.003; wv) AppleWebKit/537.36 \
     (KHTML, like Gecko) Version/4.0 Chrome/135.0.7049.37 Mobile Safari/537.36"
        .to_string()
}

fn default_accept_language() -> String {
    "zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7".to_string()
}

fn default_referer_path() -> String {
    "PPage/ComePage?flowID=15".to_string()
}

fn default_imei_ticket() -> String {
    DEFAULT_IMEI_TICKET.to_string()
}

fn default_source_type_ticket() -> String {
    DEFAULT_SOURCE_TYPE_TICKET.to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_fallback_page_size() -> usize {
    15
}

fn default_event_buffer() -> usize {
    1000
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second pacing)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
