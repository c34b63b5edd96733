use crate::{ExportError, LongTable, ObjectStore};
use async_trait::async_trait;
use pondcast_core::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use slog::{debug, error, info, warn, Logger};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Success,
    Failure,
    Cancelled,
}

impl FromStr for JobState {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "ready" | "running" | "queued" => Ok(JobState::Pending),
            "success" | "succeeded" | "completed" => Ok(JobState::Success),
            "failure" | "failed" => Ok(JobState::Failure),
            "cancelled" | "canceled" => Ok(JobState::Cancelled),
            other => Err(ExportError::Request(format!("unknown job state '{}'", other))),
        }
    }
}

/// Handle to a submitted export
#[async_trait]
pub trait ExportJob: Send + Sync {
    fn id(&self) -> String;
    async fn status(&self) -> Result<JobState, ExportError>;
}

/// Bulk export backend the long table is handed to
#[async_trait]
pub trait ExportService: Send + Sync {
    /// `destination` names the object the exported csv ends up under
    async fn submit(
        &self,
        table: &LongTable,
        destination: &str,
    ) -> Result<Box<dyn ExportJob>, ExportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT),
        }
    }
}

/// How waiting on an export ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    /// The service reported the job as cancelled
    Cancelled,
    TimedOut,
    /// We stopped waiting because the run was cancelled locally
    Interrupted,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled by the export service",
            JobOutcome::TimedOut => "timed out",
            JobOutcome::Interrupted => "interrupted",
        };
        write!(f, "{}", text)
    }
}

/// Polls `job` until it reaches a terminal state, the timeout elapses or
/// `cancel` fires. A failed status check is logged and treated as pending.
pub async fn monitor_job(
    job: &dyn ExportJob,
    settings: PollSettings,
    cancel: &CancellationToken,
    logger: &Logger,
) -> JobOutcome {
    let id = job.id();
    info!(
        logger,
        "waiting on export job {} (poll every {:?}, timeout {:?})",
        id,
        settings.interval,
        settings.timeout
    );

    let deadline = sleep(settings.timeout);
    tokio::pin!(deadline);
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(logger, "stopped waiting on export job {}: run cancelled", id);
                return JobOutcome::Interrupted;
            }
            _ = &mut deadline => {
                error!(logger, "export job {} did not finish within {:?}", id, settings.timeout);
                return JobOutcome::TimedOut;
            }
            _ = ticker.tick() => {
                match job.status().await {
                    Ok(JobState::Pending) => debug!(logger, "export job {} still pending", id),
                    Ok(JobState::Success) => {
                        info!(logger, "export job {} succeeded", id);
                        return JobOutcome::Succeeded;
                    }
                    Ok(JobState::Failure) => {
                        error!(logger, "export job {} failed", id);
                        return JobOutcome::Failed;
                    }
                    Ok(JobState::Cancelled) => {
                        warn!(logger, "export job {} was cancelled by the service", id);
                        return JobOutcome::Cancelled;
                    }
                    Err(e) => warn!(logger, "status check for export job {} failed: {}", id, e),
                }
            }
        }
    }
}

/// Export that writes the long table straight into an object store
pub struct ObjectStoreExport {
    store: Arc<dyn ObjectStore>,
    logger: Logger,
}

impl ObjectStoreExport {
    pub fn new(store: Arc<dyn ObjectStore>, logger: Logger) -> Self {
        Self { store, logger }
    }
}

#[async_trait]
impl ExportService for ObjectStoreExport {
    async fn submit(
        &self,
        table: &LongTable,
        destination: &str,
    ) -> Result<Box<dyn ExportJob>, ExportError> {
        let bytes = table.to_csv_bytes()?;
        info!(
            self.logger,
            "exporting {} rows ({} bytes) to {}",
            table.len(),
            bytes.len(),
            destination
        );
        self.store.put(destination, bytes).await?;
        Ok(Box::new(FinishedJob {
            id: destination.to_owned(),
            state: JobState::Success,
        }))
    }
}

/// A job whose state is known at submission time
pub struct FinishedJob {
    id: String,
    state: JobState,
}

#[async_trait]
impl ExportJob for FinishedJob {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn status(&self) -> Result<JobState, ExportError> {
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard};

    #[test]
    fn parses_service_states() {
        assert_eq!("RUNNING".parse::<JobState>().unwrap(), JobState::Pending);
        assert_eq!("succeeded".parse::<JobState>().unwrap(), JobState::Success);
        assert_eq!("canceled".parse::<JobState>().unwrap(), JobState::Cancelled);
        assert!("exploded".parse::<JobState>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_job_resolves_on_first_poll() {
        let job = FinishedJob {
            id: "predict".into(),
            state: JobState::Failure,
        };
        let outcome = monitor_job(
            &job,
            PollSettings::default(),
            &CancellationToken::new(),
            &Logger::root(Discard, o!()),
        )
        .await;
        assert_eq!(outcome, JobOutcome::Failed);
        assert!(!outcome.is_success());
    }
}
