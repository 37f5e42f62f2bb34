use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Lifecycle status recorded on a sync log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Started,
    Processing,
    BulkOperationStarted,
    CleaningDuplicates,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl SyncLogStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncLogStatus::Started => "started",
            SyncLogStatus::Processing => "processing",
            SyncLogStatus::BulkOperationStarted => "bulk_operation_started",
            SyncLogStatus::CleaningDuplicates => "cleaning_duplicates",
            SyncLogStatus::Completed => "completed",
            SyncLogStatus::CompletedWithErrors => "completed_with_errors",
            SyncLogStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncLogStatus::Completed | SyncLogStatus::CompletedWithErrors | SyncLogStatus::Failed
        )
    }

    /// Statuses that count as a successful run for scheduling purposes.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(
            self,
            SyncLogStatus::Completed | SyncLogStatus::CompletedWithErrors
        )
    }
}

impl fmt::Display for SyncLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncLogStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "started" => SyncLogStatus::Started,
            "processing" => SyncLogStatus::Processing,
            "bulk_operation_started" => SyncLogStatus::BulkOperationStarted,
            "cleaning_duplicates" => SyncLogStatus::CleaningDuplicates,
            "completed" => SyncLogStatus::Completed,
            "completed_with_errors" => SyncLogStatus::CompletedWithErrors,
            "failed" => SyncLogStatus::Failed,
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown sync log status '{other}'"
                )))
            }
        })
    }
}

/// Fields to change on a sync log row; `None` keeps the stored value.
///
/// Setting a terminal status stamps `end_time`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLogUpdate {
    pub status: Option<SyncLogStatus>,
    pub message: Option<String>,
    pub items_processed: Option<i32>,
    pub items_succeeded: Option<i32>,
    pub items_failed: Option<i32>,
}

impl SyncLogUpdate {
    #[must_use]
    pub fn phase(status: SyncLogStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(SyncLogStatus::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SyncLogStatus::Started,
            SyncLogStatus::Processing,
            SyncLogStatus::BulkOperationStarted,
            SyncLogStatus::CleaningDuplicates,
            SyncLogStatus::Completed,
            SyncLogStatus::CompletedWithErrors,
            SyncLogStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SyncLogStatus>().unwrap(), status);
        }
    }

    #[test]
    fn only_final_statuses_are_terminal() {
        assert!(SyncLogStatus::Failed.is_terminal());
        assert!(SyncLogStatus::CompletedWithErrors.is_terminal());
        assert!(!SyncLogStatus::CleaningDuplicates.is_terminal());
    }

    #[test]
    fn completed_with_errors_counts_as_success() {
        assert!(SyncLogStatus::CompletedWithErrors.is_success());
        assert!(!SyncLogStatus::Failed.is_success());
    }

    #[test]
    fn phase_update_is_not_terminal() {
        let update = SyncLogUpdate::phase(SyncLogStatus::Processing, "fetched 3 records");
        assert!(!update.is_terminal());
        assert_eq!(update.message.as_deref(), Some("fetched 3 records"));
    }
}
