//! Feed download and record extraction.

mod ftp;

use std::time::Duration;

use async_trait::async_trait;
use catsync_core::{SourceCredentials, SourceType};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::SyncError;

pub use ftp::{FtpError, FtpLogin, DEFAULT_FTP_PORT};

/// Downloads and parses a feed document.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(
        &self,
        source_type: SourceType,
        credentials: &SourceCredentials,
    ) -> Result<Value, SyncError>;
}

/// Fetches feeds over FTP, HTTP(S), or from the local filesystem, with at
/// most `max_concurrency` transfers in flight.
pub struct SourceFetcher {
    http: reqwest::Client,
    timeout: Duration,
    limiter: Semaphore,
}

impl SourceFetcher {
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: u64, user_agent: &str, max_concurrency: usize) -> Result<Self, SyncError> {
        let timeout = Duration::from_secs(timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| SyncError::Configuration(format!("feed HTTP client: {e}")))?;
        Ok(Self {
            http,
            timeout,
            limiter: Semaphore::new(max_concurrency.max(1)),
        })
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &catsync_core::AppConfig) -> Result<Self, SyncError> {
        Self::new(
            config.feed_request_timeout_secs,
            &config.user_agent,
            config.feed_max_concurrency,
        )
    }

    async fn download(
        &self,
        source_type: SourceType,
        credentials: &SourceCredentials,
    ) -> Result<Vec<u8>, SyncError> {
        match source_type {
            SourceType::LocalFile => tokio::fs::read(&credentials.file_path)
                .await
                .map_err(|e| SyncError::SourceFetch(format!("{}: {e}", credentials.file_path))),
            SourceType::Http => self.download_http(credentials).await,
            SourceType::Ftp => {
                let host = credentials.host.trim().to_owned();
                let login = FtpLogin {
                    host: host.clone(),
                    port: credentials.port.unwrap_or(DEFAULT_FTP_PORT),
                    user: credentials.user.clone(),
                    password: credentials.password.clone(),
                };
                let transfer = ftp::retrieve(login, credentials.file_path.clone(), self.timeout);
                tokio::time::timeout(self.timeout, transfer)
                    .await
                    .map_err(|_| {
                        SyncError::SourceFetch(format!(
                            "FTP transfer from {host} timed out after {}s",
                            self.timeout.as_secs()
                        ))
                    })?
                    .map_err(|e| SyncError::SourceFetch(format!("{host}: {e}")))
            }
        }
    }

    async fn download_http(&self, credentials: &SourceCredentials) -> Result<Vec<u8>, SyncError> {
        let url = http_url(credentials);
        let mut request = self.http.get(&url);
        if let Some(user) = credentials.user.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(user, credentials.password.as_deref());
        }
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::SourceFetch(format!("GET {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SourceFetch(format!(
                "GET {url} returned HTTP {}",
                status.as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::SourceFetch(format!("GET {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for SourceFetcher {
    async fn fetch(
        &self,
        source_type: SourceType,
        credentials: &SourceCredentials,
    ) -> Result<Value, SyncError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| SyncError::SourceFetch("feed limiter closed".to_owned()))?;
        let bytes = self.download(source_type, credentials).await?;
        tracing::debug!(
            source = %source_type,
            path = %credentials.file_path,
            bytes = bytes.len(),
            "downloaded feed"
        );
        serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::SourceFetch(format!(
                "{} is not valid JSON: {e}",
                credentials.file_path
            ))
        })
    }
}

/// Full URL for an HTTP source. `file_path` may itself be absolute; otherwise
/// it is joined onto `host` (default scheme `https`) and the optional port.
pub(crate) fn http_url(credentials: &SourceCredentials) -> String {
    let path = credentials.file_path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let host = credentials.host.trim().trim_end_matches('/');
    let (scheme, authority) = host.split_once("://").unwrap_or(("https", host));
    let authority = match credentials.port {
        Some(port) if !authority.contains(':') => format!("{authority}:{port}"),
        _ => authority.to_owned(),
    };
    format!("{scheme}://{authority}/{}", path.trim_start_matches('/'))
}

/// Applies the dot-separated `data_path` and returns the record list.
///
/// A single object at the path is treated as a one-record feed. A missing
/// path is an error rather than an empty feed, since an empty feed would
/// schedule every tracked product for deletion.
///
/// # Errors
///
/// Returns [`SyncError::SourceFetch`] if the path does not resolve or does
/// not point at an array or object.
pub fn extract_records(document: Value, data_path: Option<&str>) -> Result<Vec<Value>, SyncError> {
    let mut current = document;
    if let Some(path) = data_path.map(str::trim).filter(|p| !p.is_empty()) {
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(mut map) => map.remove(segment),
                Value::Array(mut items) => segment
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < items.len())
                    .map(|i| items.swap_remove(i)),
                _ => None,
            }
            .ok_or_else(|| {
                SyncError::SourceFetch(format!("data path '{path}' not found in feed document"))
            })?;
        }
    }

    match current {
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        other => Err(SyncError::SourceFetch(format!(
            "feed data is a {} rather than a list of records",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
