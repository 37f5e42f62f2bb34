//! Bulk job lifecycle: stage → upload → submit → poll → parse results.
//!
//! The platform runs one bulk mutation per shop at a time, so every batch
//! holds the engine's bulk lock from staging until the job is terminal.

use std::fmt;
use std::time::Duration;

use catsync_shopify::queries::BULK_PRODUCT_SET;
use catsync_shopify::{BulkOperation, BulkOperationStatus, ShopifyClient};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::categorizer::WriteItem;
use crate::error::SyncError;
use crate::outcome::BatchOutcome;
use crate::store::TrackingStore;

/// Largest number of entities sent in one bulk job.
pub const MAX_BULK_BATCH: usize = 1000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkJobState {
    Staging,
    Uploading,
    Submitted,
    Created,
    Running,
    Canceling,
    Completed,
    Failed,
    Canceled,
}

impl BulkJobState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BulkJobState::Staging => "STAGING",
            BulkJobState::Uploading => "UPLOADING",
            BulkJobState::Submitted => "SUBMITTED",
            BulkJobState::Created => "CREATED",
            BulkJobState::Running => "RUNNING",
            BulkJobState::Canceling => "CANCELING",
            BulkJobState::Completed => "COMPLETED",
            BulkJobState::Failed => "FAILED",
            BulkJobState::Canceled => "CANCELED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BulkJobState::Completed | BulkJobState::Failed | BulkJobState::Canceled
        )
    }

    /// Local state for a platform status. `EXPIRED` is a failure; an
    /// unrecognized status keeps the job polling.
    #[must_use]
    pub fn from_remote(status: BulkOperationStatus) -> Self {
        match status {
            BulkOperationStatus::Created => BulkJobState::Created,
            BulkOperationStatus::Running | BulkOperationStatus::Unknown => BulkJobState::Running,
            BulkOperationStatus::Canceling => BulkJobState::Canceling,
            BulkOperationStatus::Completed => BulkJobState::Completed,
            BulkOperationStatus::Canceled => BulkJobState::Canceled,
            BulkOperationStatus::Failed | BulkOperationStatus::Expired => BulkJobState::Failed,
        }
    }

    /// Whether `next` is a legal successor. Any live state may fail.
    #[must_use]
    pub fn can_transition_to(self, next: BulkJobState) -> bool {
        use BulkJobState::{
            Canceled, Canceling, Completed, Created, Failed, Running, Staging, Submitted,
            Uploading,
        };
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Staging, Uploading)
                | (Uploading, Submitted)
                | (Submitted | Created, Created)
                | (Submitted | Created | Running, Running | Completed | Canceled | Canceling)
                | (Canceling, Canceling | Canceled | Completed)
        )
    }
}

impl fmt::Display for BulkJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one job's state and refuses to move past a terminal state.
#[derive(Debug)]
struct BulkJob {
    state: BulkJobState,
}

impl BulkJob {
    fn new() -> Self {
        Self {
            state: BulkJobState::Staging,
        }
    }

    fn advance(&mut self, next: BulkJobState, operation_id: Option<&str>) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                from = %self.state,
                to = %next,
                bulk_operation_id = operation_id.unwrap_or_default(),
                "unexpected bulk job transition"
            );
            if self.state.is_terminal() {
                return;
            }
        }
        self.state = next;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BulkSettings {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// One parsed line of a bulk job's result file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLine {
    /// Zero-based index of the input line this result answers.
    pub line_number: Option<usize>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub errors: Vec<String>,
}

impl ResultLine {
    fn is_success(&self) -> bool {
        self.errors.is_empty() && self.product_id.is_some()
    }
}

/// Parses a JSONL result stream line by line; unparseable lines are dropped.
#[must_use]
pub fn parse_result_lines(body: &str) -> Vec<ResultLine> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .map(|v| {
            let payload = &v["data"]["productSet"];
            let product = &payload["product"];
            let mut errors: Vec<String> = payload["userErrors"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|e| e["message"].as_str().map(str::to_owned))
                .collect();
            errors.extend(
                v["errors"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|e| e["message"].as_str().map(str::to_owned)),
            );
            ResultLine {
                line_number: v["__lineNumber"]
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok()),
                product_id: product["id"].as_str().map(str::to_owned),
                variant_id: product["variants"]["edges"][0]["node"]["id"]
                    .as_str()
                    .map(str::to_owned),
                errors,
            }
        })
        .collect()
}

/// The staged variables file: one `{"input": ProductSetInput}` per line.
#[must_use]
pub fn build_jsonl(items: &[WriteItem], location_id: Option<&str>) -> String {
    items
        .iter()
        .map(|item| serde_json::json!({ "input": item.product_set_input(location_id) }).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs create or update sets as bulk jobs and records the outcome.
pub struct BulkRunner<'a> {
    pub client: &'a ShopifyClient,
    pub tracking: &'a dyn TrackingStore,
    pub config_id: Uuid,
    pub settings: BulkSettings,
    pub lock: &'a Mutex<()>,
}

impl BulkRunner<'_> {
    /// Executes `items` in batches of at most [`MAX_BULK_BATCH`]. A failed
    /// batch counts all of its items as failed; later batches still run.
    pub async fn execute(&self, items: &[WriteItem], location_id: Option<&str>) -> BatchOutcome {
        let mut total = BatchOutcome::default();
        for batch in items.chunks(MAX_BULK_BATCH) {
            let outcome = match self.run_batch(batch, location_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        config_id = %self.config_id,
                        batch_len = batch.len(),
                        error = %e,
                        "bulk batch failed"
                    );
                    BatchOutcome::all_failed(batch.len(), e.to_string())
                }
            };
            total.merge(outcome);
        }
        total
    }

    async fn run_batch(
        &self,
        batch: &[WriteItem],
        location_id: Option<&str>,
    ) -> Result<BatchOutcome, SyncError> {
        let mut job = BulkJob::new();
        let guard = self.lock.lock().await;

        let target = self.client.create_staged_upload().await?;
        let staged_path = target
            .staged_upload_path()
            .ok_or_else(|| SyncError::Transport("staged upload target has no key".to_owned()))?
            .to_owned();

        job.advance(BulkJobState::Uploading, None);
        self.client
            .upload_staged(&target, build_jsonl(batch, location_id))
            .await?;

        job.advance(BulkJobState::Submitted, None);
        let submitted = self
            .client
            .run_bulk_mutation(BULK_PRODUCT_SET, &staged_path)
            .await?;
        tracing::info!(
            config_id = %self.config_id,
            bulk_operation_id = %submitted.id,
            items = batch.len(),
            "bulk operation submitted"
        );

        let operation = self.poll_to_terminal(&mut job, submitted).await?;
        drop(guard);

        match job.state {
            BulkJobState::Completed => Ok(self.record_completion(batch, &operation).await),
            state => {
                let reason = format!(
                    "bulk operation {} ended {state}{}",
                    operation.id,
                    operation
                        .error_code
                        .as_deref()
                        .map(|c| format!(" ({c})"))
                        .unwrap_or_default()
                );
                tracing::error!(
                    config_id = %self.config_id,
                    bulk_operation_id = %operation.id,
                    state = %state,
                    "bulk operation did not complete"
                );
                Ok(BatchOutcome::all_failed(batch.len(), reason))
            }
        }
    }

    /// Polls at a fixed interval. Never polls once the job is terminal.
    async fn poll_to_terminal(
        &self,
        job: &mut BulkJob,
        mut operation: BulkOperation,
    ) -> Result<BulkOperation, SyncError> {
        job.advance(BulkJobState::from_remote(operation.status), Some(&operation.id));
        let mut attempts = 0;
        while !job.state.is_terminal() {
            if attempts >= self.settings.max_poll_attempts {
                return Err(SyncError::Timeout {
                    operation_id: operation.id,
                    status: job.state.to_string(),
                    attempts,
                });
            }
            attempts += 1;
            tokio::time::sleep(self.settings.poll_interval).await;
            match self.client.bulk_operation(&operation.id).await {
                Ok(next) => {
                    job.advance(BulkJobState::from_remote(next.status), Some(&next.id));
                    tracing::debug!(
                        bulk_operation_id = %next.id,
                        state = %job.state,
                        object_count = next.object_count,
                        attempt = attempts,
                        "polled bulk operation"
                    );
                    operation = next;
                }
                Err(e) => {
                    tracing::warn!(
                        bulk_operation_id = %operation.id,
                        attempt = attempts,
                        error = %e,
                        "bulk status poll failed"
                    );
                }
            }
        }
        Ok(operation)
    }

    async fn record_completion(&self, batch: &[WriteItem], operation: &BulkOperation) -> BatchOutcome {
        let lines = match operation.url.as_deref() {
            Some(url) => match self.client.fetch_result_file(url).await {
                Ok(body) => Some(parse_result_lines(&body)),
                Err(e) => {
                    tracing::warn!(
                        bulk_operation_id = %operation.id,
                        error = %e,
                        "could not download bulk results"
                    );
                    None
                }
            },
            None => None,
        };

        let reported = usize::try_from(operation.object_count).unwrap_or(usize::MAX);
        let processed = match &lines {
            // The counter can lag at completion; fall back to the result stream.
            Some(lines) if reported == 0 => lines.len(),
            _ => reported,
        };
        let line_errors: Vec<String> = lines
            .iter()
            .flatten()
            .filter(|l| !l.errors.is_empty())
            .map(|l| l.errors.join("; "))
            .collect();
        let succeeded = processed.min(batch.len()).saturating_sub(line_errors.len());
        let failed = batch.len() - succeeded;

        match &lines {
            Some(lines) if !lines.is_empty() => {
                for line in lines.iter().filter(|l| l.is_success()) {
                    let (Some(idx), Some(product_id)) = (line.line_number, &line.product_id) else {
                        continue;
                    };
                    if let Some(item) = batch.get(idx) {
                        self.track(item, product_id, line.variant_id.as_deref()).await;
                    }
                }
            }
            _ if failed == 0 => {
                for item in batch {
                    if let Some(identity) = &item.identity {
                        self.track(item, &identity.entity_id, Some(&identity.variant_id))
                            .await;
                    }
                }
            }
            _ => {}
        }

        tracing::info!(
            config_id = %self.config_id,
            bulk_operation_id = %operation.id,
            processed,
            succeeded,
            failed,
            "bulk operation completed"
        );
        let mut errors = line_errors;
        if failed > errors.len() {
            errors.push(format!(
                "bulk operation {} handled {processed} of {} items",
                operation.id,
                batch.len()
            ));
        }
        BatchOutcome {
            processed,
            succeeded,
            failed,
            errors,
        }
    }

    async fn track(&self, item: &WriteItem, product_id: &str, variant_id: Option<&str>) {
        if let Err(e) = self
            .tracking
            .upsert(
                self.config_id,
                &item.entity.sku,
                product_id,
                variant_id,
                &item.entity.record,
            )
            .await
        {
            tracing::warn!(
                config_id = %self.config_id,
                sku = %item.entity.sku,
                error = %e,
                "failed to record tracking after bulk write"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [
            BulkJobState::Staging,
            BulkJobState::Uploading,
            BulkJobState::Submitted,
            BulkJobState::Running,
            BulkJobState::Running,
            BulkJobState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_have_no_successors() {
        for terminal in [BulkJobState::Completed, BulkJobState::Failed, BulkJobState::Canceled] {
            assert!(!terminal.can_transition_to(BulkJobState::Running));
            assert!(!terminal.can_transition_to(BulkJobState::Failed));
        }
    }

    #[test]
    fn job_stays_terminal() {
        let mut job = BulkJob::new();
        job.advance(BulkJobState::Uploading, None);
        job.advance(BulkJobState::Submitted, None);
        job.advance(BulkJobState::Failed, None);
        job.advance(BulkJobState::Running, None);
        assert_eq!(job.state, BulkJobState::Failed);
    }

    #[test]
    fn expired_is_failure_and_canceling_keeps_polling() {
        assert_eq!(
            BulkJobState::from_remote(BulkOperationStatus::Expired),
            BulkJobState::Failed
        );
        assert!(!BulkJobState::from_remote(BulkOperationStatus::Canceling).is_terminal());
    }

    #[test]
    fn result_lines_parse_independently() {
        let body = concat!(
            r#"{"data":{"productSet":{"product":{"id":"p1","variants":{"edges":[{"node":{"id":"v1","sku":"A"}}]}},"userErrors":[]}},"__lineNumber":0}"#,
            "\n",
            "not json\n",
            r#"{"data":{"productSet":{"product":null,"userErrors":[{"field":["input"],"message":"Handle taken"}]}},"__lineNumber":1}"#,
            "\n"
        );
        let lines = parse_result_lines(body);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_number, Some(0));
        assert_eq!(lines[0].product_id.as_deref(), Some("p1"));
        assert_eq!(lines[0].variant_id.as_deref(), Some("v1"));
        assert!(lines[0].is_success());
        assert_eq!(lines[1].errors, vec!["Handle taken".to_string()]);
        assert!(!lines[1].is_success());
    }
}
