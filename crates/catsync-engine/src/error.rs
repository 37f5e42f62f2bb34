use catsync_core::ConfigError;
use catsync_shopify::ShopifyError;
use thiserror::Error;

use crate::store::StoreError;

/// Run-level failure taxonomy.
///
/// Only [`SyncError::Configuration`], [`SyncError::SourceFetch`] and
/// [`SyncError::Store`] end a run. The other variants are recorded against
/// an item or a bulk batch and the run continues.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("feed fetch failed: {0}")]
    SourceFetch(String),

    #[error("rejected by the platform: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("bulk operation {operation_id} still {status} after {attempts} polls")]
    Timeout {
        operation_id: String,
        status: String,
        attempts: u32,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::Configuration(err.to_string())
    }
}

impl From<ShopifyError> for SyncError {
    fn from(err: ShopifyError) -> Self {
        if err.is_validation() {
            SyncError::Validation(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl SyncError {
    /// `true` when the error ends the whole run rather than one item or batch.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_) | SyncError::SourceFetch(_) | SyncError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catsync_shopify::UserError;

    #[test]
    fn user_errors_become_validation() {
        let err: SyncError = ShopifyError::UserErrors(vec![UserError {
            field: None,
            message: "bad".to_string(),
        }])
        .into();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn transport_errors_are_not_fatal() {
        let err: SyncError = ShopifyError::UnexpectedStatus {
            status: 502,
            url: "x".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn config_errors_are_fatal() {
        let err: SyncError = ConfigError::Validation("no host".to_string()).into();
        assert!(err.is_fatal());
    }
}
