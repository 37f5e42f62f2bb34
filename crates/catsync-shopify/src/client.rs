use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{ShopifyError, UserError};
use crate::retry::retry_with_backoff;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

/// Transport settings for [`ShopifyClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_version: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Additional attempts after the first failure for transient errors.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Admin API calls allowed in flight at once across every caller of this client.
    pub max_concurrency: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: "2024-10".to_string(),
            timeout_secs: 30,
            user_agent: "catsync/0.1 (catalog-sync)".to_string(),
            max_retries: 3,
            backoff_base_ms: 1_000,
            max_concurrency: 5,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn from_app_config(config: &catsync_core::AppConfig) -> Self {
        Self {
            api_version: config.shopify_api_version.clone(),
            timeout_secs: config.api_request_timeout_secs,
            user_agent: config.user_agent.clone(),
            max_retries: config.api_max_retries,
            backoff_base_ms: config.api_retry_backoff_base_ms,
            max_concurrency: config.api_max_concurrency,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphQlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

/// GraphQL Admin API client.
///
/// Every request passes through a shared semaphore so the whole process stays
/// within the platform's rate budget, and transient failures (429, GraphQL
/// `THROTTLED`, network errors, 5xx) are retried with jittered back-off.
#[derive(Clone)]
pub struct ShopifyClient {
    pub(crate) http: Client,
    endpoint: String,
    access_token: String,
    max_retries: u32,
    backoff_base_ms: u64,
    limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"[redacted]")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// `https://{domain}` for a bare shop domain; a value that already carries a
/// scheme is used as-is (tests point this at a mock server).
fn shop_origin(shop_domain: &str) -> String {
    let trimmed = shop_domain.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    }
}

impl ShopifyClient {
    /// Builds a client for `shop_domain` (e.g. `acme.myshopify.com`).
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        shop_domain: &str,
        access_token: &str,
        options: &ClientOptions,
    ) -> Result<Self, ShopifyError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(options.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/admin/api/{}/graphql.json",
                shop_origin(shop_domain),
                options.api_version
            ),
            access_token: access_token.to_owned(),
            max_retries: options.max_retries,
            backoff_base_ms: options.backoff_base_ms,
            limiter: Arc::new(Semaphore::new(options.max_concurrency.max(1))),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one GraphQL document and returns its `data` object.
    ///
    /// # Errors
    ///
    /// - [`ShopifyError::RateLimited`]: HTTP 429 or `THROTTLED` after all retries.
    /// - [`ShopifyError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`ShopifyError::GraphQl`]: the response carries top-level `errors`.
    /// - [`ShopifyError::MissingData`]: no `data` object in the response.
    /// - [`ShopifyError::Http`]: network or TLS failure after all retries.
    pub async fn execute(&self, document: &str, variables: Value) -> Result<Value, ShopifyError> {
        let body = serde_json::json!({ "query": document, "variables": variables });

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let body = &body;
            async move {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|_| ShopifyError::MissingData("request permit".to_owned()))?;
                self.send_once(body).await
            }
        })
        .await
    }

    /// [`Self::execute`] followed by decoding `data` into `T`.
    ///
    /// # Errors
    ///
    /// Everything [`Self::execute`] returns, plus [`ShopifyError::Deserialize`].
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Value,
        context: &str,
    ) -> Result<T, ShopifyError> {
        let data = self.execute(document, variables).await?;
        serde_json::from_value(data).map_err(|source| ShopifyError::Deserialize {
            context: context.to_owned(),
            source,
        })
    }

    async fn send_once(&self, body: &Value) -> Result<Value, ShopifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(body)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = retry_after(&response).unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ShopifyError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(ShopifyError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let text = response.text().await?;
        let parsed: GraphQlResponse =
            serde_json::from_str(&text).map_err(|source| ShopifyError::Deserialize {
                context: "GraphQL response envelope".to_owned(),
                source,
            })?;

        if !parsed.errors.is_empty() {
            let throttled = parsed.errors.iter().any(|e| {
                e.extensions
                    .as_ref()
                    .and_then(|x| x.code.as_deref())
                    .is_some_and(|c| c == "THROTTLED")
            });
            if throttled {
                return Err(ShopifyError::RateLimited {
                    retry_after_secs: 1,
                });
            }
            let message = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ShopifyError::GraphQl(message));
        }

        parsed
            .data
            .filter(|d| !d.is_null())
            .ok_or_else(|| ShopifyError::MissingData("data".to_owned()))
    }
}

/// `Retry-After` in whole seconds; the platform may send fractional values.
fn retry_after(response: &reqwest::Response) -> Option<u64> {
    let secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = secs.ceil().max(0.0) as u64;
    Some(whole)
}

/// Turns a non-empty `userErrors` list into [`ShopifyError::UserErrors`].
pub(crate) fn check_user_errors(errors: Vec<UserError>) -> Result<(), ShopifyError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ShopifyError::UserErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_domain_gets_https_scheme() {
        assert_eq!(shop_origin("acme.myshopify.com"), "https://acme.myshopify.com");
    }

    #[test]
    fn explicit_scheme_and_trailing_slash_are_normalized() {
        assert_eq!(shop_origin("http://127.0.0.1:9000/"), "http://127.0.0.1:9000");
    }

    #[test]
    fn endpoint_includes_api_version() {
        let client = ShopifyClient::new(
            "acme.myshopify.com",
            "shpat_x",
            &ClientOptions {
                api_version: "2025-01".to_string(),
                ..ClientOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://acme.myshopify.com/admin/api/2025-01/graphql.json"
        );
    }

    #[test]
    fn debug_redacts_access_token() {
        let client =
            ShopifyClient::new("acme.myshopify.com", "shpat_secret", &ClientOptions::default())
                .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("shpat_secret"));
    }
}
