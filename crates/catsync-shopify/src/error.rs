use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Application-level validation error returned in a mutation's `userErrors`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(path) if !path.is_empty() => write!(f, "{}: {}", path.join("."), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

fn join_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by the Admin API (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Top-level GraphQL `errors` array (syntax, access, unknown field).
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("rejected by the platform: {}", join_user_errors(.0))]
    UserErrors(Vec<UserError>),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response is missing {0}")]
    MissingData(String),

    #[error("staged upload failed with HTTP {status}: {body}")]
    Upload { status: u16, body: String },
}

impl ShopifyError {
    /// `true` for per-item validation failures as opposed to transport problems.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, ShopifyError::UserErrors(_))
    }
}
