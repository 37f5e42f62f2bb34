//! At most one run per configuration, plus retry and schedule triggers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catsync_core::SyncConfiguration;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::SyncError;
use crate::store::{ConfigStore, SyncLogEntry, SyncLogStore};
use crate::sync::{RunOptions, RunSummary, SyncEngine};

/// Anything that can execute one run for a configuration.
#[async_trait]
pub trait RunSync: Send + Sync {
    async fn run(&self, config_id: Uuid, options: RunOptions) -> Result<RunSummary, SyncError>;
}

#[async_trait]
impl RunSync for SyncEngine {
    async fn run(&self, config_id: Uuid, options: RunOptions) -> Result<RunSummary, SyncError> {
        self.run_sync(config_id, options).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Default)]
struct InFlight {
    ids: Mutex<HashSet<Uuid>>,
    idle: Notify,
}

impl InFlight {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds a configuration's in-flight slot; dropping it (on return, error,
/// or panic) frees the slot.
pub struct RunGuard {
    state: Arc<InFlight>,
    config_id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut ids = self.state.lock();
        ids.remove(&self.config_id);
        if ids.is_empty() {
            self.state.idle.notify_waiters();
        }
    }
}

/// A failure newer than the latest success calls for a retry.
#[must_use]
pub fn needs_retry(last_success: Option<&SyncLogEntry>, last_failure: Option<&SyncLogEntry>) -> bool {
    let finished = |e: &SyncLogEntry| e.end_time.unwrap_or(e.start_time);
    match (last_success, last_failure) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(ok), Some(failed)) => finished(failed) > finished(ok),
    }
}

/// A configuration is due once `frequency_hours` have passed since its last
/// success, or immediately if it never succeeded.
#[must_use]
pub fn is_due(last_success: Option<DateTime<Utc>>, frequency_hours: u32, now: DateTime<Utc>) -> bool {
    match last_success {
        None => true,
        Some(at) => now - at >= chrono::Duration::hours(i64::from(frequency_hours)),
    }
}

#[derive(Clone)]
pub struct RunCoordinator {
    runner: Arc<dyn RunSync>,
    configs: Arc<dyn ConfigStore>,
    logs: Arc<dyn SyncLogStore>,
    state: Arc<InFlight>,
}

impl RunCoordinator {
    #[must_use]
    pub fn new(
        runner: Arc<dyn RunSync>,
        configs: Arc<dyn ConfigStore>,
        logs: Arc<dyn SyncLogStore>,
    ) -> Self {
        Self {
            runner,
            configs,
            logs,
            state: Arc::new(InFlight::default()),
        }
    }

    /// Wires a coordinator around an engine and its stores.
    #[must_use]
    pub fn for_engine(engine: Arc<SyncEngine>) -> Self {
        let stores = engine.stores().clone();
        Self::new(engine, stores.configs, stores.logs)
    }

    /// Claims the slot for `config_id`, or `None` if a run already holds it.
    #[must_use]
    pub fn try_acquire(&self, config_id: Uuid) -> Option<RunGuard> {
        let mut ids = self.state.lock();
        ids.insert(config_id).then(|| RunGuard {
            state: Arc::clone(&self.state),
            config_id,
        })
    }

    #[must_use]
    pub fn in_flight(&self) -> Vec<Uuid> {
        self.state.lock().iter().copied().collect()
    }

    /// Runs in the current task. `None` when a run for the same
    /// configuration is already in flight.
    pub async fn run_now(
        &self,
        config_id: Uuid,
        options: RunOptions,
    ) -> Option<Result<RunSummary, SyncError>> {
        let Some(_guard) = self.try_acquire(config_id) else {
            tracing::info!(config_id = %config_id, "sync already in progress; skipping");
            return None;
        };
        Some(self.runner.run(config_id, options).await)
    }

    /// Starts a run on a background task.
    pub fn trigger(&self, config_id: Uuid, options: RunOptions) -> TriggerOutcome {
        let Some(guard) = self.try_acquire(config_id) else {
            tracing::info!(config_id = %config_id, "sync already in progress; skipping");
            return TriggerOutcome::AlreadyRunning;
        };
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = runner.run(config_id, options).await {
                tracing::error!(config_id = %config_id, error = %e, "triggered sync failed");
            }
        });
        TriggerOutcome::Started
    }

    /// Waits until no run is in flight. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.state.idle.notified();
            if self.state.lock().is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.state.lock().is_empty();
            }
        }
    }

    async fn active_configs(&self) -> Result<Vec<SyncConfiguration>, SyncError> {
        Ok(self
            .configs
            .list()
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect())
    }

    /// Triggers every active configuration whose latest failure is newer
    /// than its latest success. Returns how many runs started.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if configurations cannot be listed.
    pub async fn retry_failed_syncs(&self) -> Result<usize, SyncError> {
        let mut started = 0;
        for config in self.active_configs().await? {
            let (success, failure) = match (
                self.logs.last_success(config.id).await,
                self.logs.last_failure(config.id).await,
            ) {
                (Ok(s), Ok(f)) => (s, f),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(config_id = %config.id, error = %e, "could not read sync history");
                    continue;
                }
            };
            if needs_retry(success.as_ref(), failure.as_ref()) {
                tracing::info!(config_id = %config.id, name = %config.name, "retrying failed sync");
                if self.trigger(config.id, RunOptions::default()) == TriggerOutcome::Started {
                    started += 1;
                }
            }
        }
        Ok(started)
    }

    /// Active configurations due for a run at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if configurations cannot be listed.
    pub async fn due_configs(&self, now: DateTime<Utc>) -> Result<Vec<SyncConfiguration>, SyncError> {
        let mut due = Vec::new();
        for config in self.active_configs().await? {
            let last = match self.logs.last_success(config.id).await {
                Ok(entry) => entry.and_then(|e| e.end_time),
                Err(e) => {
                    tracing::warn!(config_id = %config.id, error = %e, "could not read sync history");
                    continue;
                }
            };
            if is_due(last, config.sync_frequency_hours, now) {
                due.push(config);
            }
        }
        Ok(due)
    }

    /// Triggers every due configuration. Returns how many runs started.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if configurations cannot be listed.
    pub async fn check_and_schedule(&self, now: DateTime<Utc>) -> Result<usize, SyncError> {
        let due = self.due_configs(now).await?;
        let mut started = 0;
        for config in &due {
            if self.trigger(config.id, RunOptions::default()) == TriggerOutcome::Started {
                started += 1;
            }
        }
        tracing::info!(due = due.len(), started, "schedule check finished");
        Ok(started)
    }
}
