//! Transaction page fetching.
//!
//! [`PageSource`] is the seam between the orchestrator and the network;
//! [`HttpPageSource`] is the production implementation talking to the
//! portal's `Report/GetPersonTrjn` endpoint.

use crate::config::PortalConfig;
use crate::credentials::{CredentialShape, Credentials};
use crate::error::{Error, FetchError, Result};
use crate::types::{PageResult, Record};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER,
};
use serde_json::Value;

/// Path of the transaction-list endpoint, relative to the portal base URL
pub const TRANSACTIONS_PATH: &str = "Report/GetPersonTrjn";

/// Characters of a response body shown in diagnostics
const BODY_PREVIEW_CHARS: usize = 200;

/// One page request
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// Session credentials
    pub credentials: Credentials,
    /// Cookie name under which the ticket is presented
    pub shape: CredentialShape,
    /// Page number, starting at 1
    pub page: u32,
    /// Card account whose history is requested
    pub subject_id: String,
    /// Optional `sourcetype` form field
    pub source_type: Option<String>,
    /// Suppress verbose diagnostics (response previews)
    pub quiet: bool,
}

impl FetchRequest {
    /// Form fields sent to the endpoint
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("account", self.subject_id.clone()),
            ("page", self.page.to_string()),
            ("json", "true".to_string()),
        ];
        if let Some(source_type) = &self.source_type {
            fields.push(("sourcetype", source_type.clone()));
        }
        fields
    }
}

/// Abstraction over page fetching, enabling testability.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of transactions
    async fn fetch_page(&self, request: &FetchRequest) -> std::result::Result<PageResult, FetchError>;
}

/// Production [`PageSource`] posting to the portal over HTTP.
pub struct HttpPageSource {
    client: reqwest::Client,
    endpoint: url::Url,
    timeout: std::time::Duration,
}

impl HttpPageSource {
    /// Build a page source for the configured portal
    pub fn new(portal: &PortalConfig) -> Result<Self> {
        let base = parse_base_url(&portal.base_url)?;
        let endpoint = base.join(TRANSACTIONS_PATH).map_err(|e| Error::Config {
            message: format!("cannot build endpoint URL: {}", e),
            key: Some("portal.base_url".to_string()),
        })?;
        let referer = base.join(&portal.referer_path).map_err(|e| Error::Config {
            message: format!("invalid referer path '{}': {}", portal.referer_path, e),
            key: Some("portal.referer_path".to_string()),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(ACCEPT_LANGUAGE, header_value(&portal.accept_language, "accept_language")?);
        headers.insert(ORIGIN, header_value(base.origin().ascii_serialization().as_str(), "base_url")?);
        headers.insert(REFERER, header_value(referer.as_str(), "referer_path")?);

        let client = reqwest::Client::builder()
            .user_agent(portal.user_agent.as_str())
            .default_headers(headers)
            .timeout(portal.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: portal.request_timeout,
        })
    }

    /// Endpoint URL requests are posted to
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, request: &FetchRequest) -> std::result::Result<PageResult, FetchError> {
        let cookie = HeaderValue::from_str(&request.shape.cookie_header(&request.credentials))
            .map_err(|_| FetchError::Transport("cookie values are not valid header text".to_string()))?;

        if request.quiet {
            tracing::trace!(page = request.page, shape = %request.shape, "requesting transaction page");
        } else {
            tracing::debug!(
                page = request.page,
                shape = %request.shape,
                sourcetype = request.source_type.is_some(),
                "requesting transaction page"
            );
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(COOKIE, cookie)
            .form(&request.form_fields())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            if !request.quiet {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(status = status.as_u16(), body = %preview(&body), "portal rejected request");
            }
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(&e))?;
        if !request.quiet {
            tracing::debug!(body = %preview(&body), "portal response");
        }

        let page = parse_page(&body)?;
        if !request.quiet {
            tracing::debug!(
                page = request.page,
                rows = page.rows.len(),
                total = page.total_count,
                "transaction page parsed"
            );
        }
        Ok(page)
    }
}

impl HttpPageSource {
    fn transport_error(&self, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Transport(format!("request timed out after {:?}", self.timeout))
        } else if e.is_connect() {
            FetchError::Transport(format!("connection to {} failed: {}", self.endpoint, e))
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Parse a transaction page body
///
/// The body must be a JSON object with a `rows` array of objects. `total`
/// may be a number or a numeric string; anything else counts as 0.
pub fn parse_page(body: &str) -> std::result::Result<PageResult, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::BadResponse(format!("body is not JSON ({}): {}", e, preview(body))))?;

    let Value::Object(mut object) = value else {
        return Err(FetchError::BadResponse(
            "body is not a JSON object".to_string(),
        ));
    };

    let rows = match object.remove("rows") {
        Some(Value::Array(rows)) => rows,
        Some(_) => {
            return Err(FetchError::BadResponse(
                "`rows` is not a list".to_string(),
            ));
        }
        None => {
            return Err(FetchError::BadResponse(
                "response has no `rows` field".to_string(),
            ));
        }
    };

    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(record) => Ok(record),
            _ => Err(FetchError::BadResponse(format!(
                "row {} is not an object",
                index
            ))),
        })
        .collect::<std::result::Result<Vec<Record>, _>>()?;

    let total_count = object.get("total").map(parse_total).unwrap_or(0);

    Ok(PageResult { rows, total_count })
}

fn parse_total(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn parse_base_url(base_url: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(base_url).map_err(|e| Error::Config {
        message: format!("invalid base URL '{}': {}", base_url, e),
        key: Some("portal.base_url".to_string()),
    })?;
    // Url::join replaces the last segment unless the path ends with '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn header_value(value: &str, key: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Config {
        message: format!("'{}' is not a valid header value: {}", value, e),
        key: Some(format!("portal.{}", key)),
    })
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
