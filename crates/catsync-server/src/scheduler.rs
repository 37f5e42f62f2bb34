//! Recurring schedule check.
//!
//! One cron job asks the coordinator which configurations are due and
//! triggers them. Runs themselves happen on their own tasks, so a slow
//! sync never delays the next check.

use catsync_engine::RunCoordinator;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the scheduler with the schedule-check job.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if `cron` does not parse, the job cannot be
/// registered, or the scheduler fails to start.
pub async fn build_scheduler(
    coordinator: RunCoordinator,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let coordinator = coordinator.clone();
        Box::pin(async move {
            run_schedule_check(&coordinator).await;
        })
    })?;
    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: registered schedule check");

    scheduler.start().await?;
    Ok(scheduler)
}

/// Triggers every due configuration and logs how many started.
pub async fn run_schedule_check(coordinator: &RunCoordinator) {
    tracing::debug!("scheduler: checking for due syncs");
    match coordinator.check_and_schedule(Utc::now()).await {
        Ok(0) => tracing::debug!("scheduler: nothing due"),
        Ok(started) => tracing::info!(started, "scheduler: started due syncs"),
        Err(e) => tracing::error!(error = %e, "scheduler: schedule check failed"),
    }
}
