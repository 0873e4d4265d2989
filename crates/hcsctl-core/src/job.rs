//! Progress tracking and job polling for asynchronous operations
//!
//! Mutating calls often answer with a `job_id` that must be polled until the
//! job reaches a terminal state. This module provides the bounded polling
//! loop with optional progress callbacks for UI updates.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PollConfig, RetryConfig};
use crate::error::{CoreError, Result};
use crate::transport::sleep_or_cancel;

/// Lifecycle of a vendor job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    /// Map a vendor status string (case-insensitive)
    pub fn from_vendor(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "success" | "completed" | "complete" | "succeeded" => JobState::Succeeded,
            "fail" | "failed" | "error" => JobState::Failed,
            "init" | "pending" | "queued" => JobState::Pending,
            _ => JobState::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// One status observation
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// Status exactly as the vendor wrote it
    pub status: String,
    /// Full job document
    pub payload: Value,
    pub failure_reason: Option<String>,
}

impl JobStatus {
    pub fn from_vendor(
        status: impl Into<String>,
        payload: Value,
        failure_reason: Option<String>,
    ) -> Self {
        let status = status.into();
        Self {
            state: JobState::from_vendor(&status),
            status,
            payload,
            failure_reason,
        }
    }
}

/// Reads the current status of a job
#[async_trait]
pub trait JobStatusCheck: Send + Sync {
    async fn check(&self, job_id: &str, cancel: &CancellationToken) -> Result<JobStatus>;
}

/// A job returned by a mutating call
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: String,
    pub started_at: Instant,
    /// Overrides the poller interval for this job
    pub poll_interval_hint: Option<Duration>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            started_at: Instant::now(),
            poll_interval_hint: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_hint = Some(interval);
        self
    }
}

/// Progress events emitted while waiting for a job
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Polling has started
    Started { job_id: String },
    /// Polling iteration with current status
    Polling {
        job_id: String,
        status: String,
        elapsed: Duration,
    },
    /// Job completed successfully
    Completed { job_id: String, elapsed: Duration },
    /// Job failed or timed out
    Failed { job_id: String, error: String },
}

/// Callback type for progress updates
///
/// The CLI uses this to drive its spinner.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// A job that reached `Succeeded`
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    pub payload: Value,
    pub elapsed: Duration,
    /// Status checks made, transient failures included
    pub polls: u32,
}

/// Polls a job until it is terminal or the ceiling is reached
pub struct JobPoller {
    interval: Duration,
    timeout: Duration,
    retry: RetryConfig,
    on_progress: Option<ProgressCallback>,
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL, Self::DEFAULT_TIMEOUT)
    }
}

impl fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPoller")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JobPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
    /// Volume attach/detach settle quickly
    pub const ATTACH_INTERVAL: Duration = Duration::from_secs(5);
    pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            retry: RetryConfig::default(),
            on_progress: None,
        }
    }

    pub fn from_config(poll: &PollConfig, retry: &RetryConfig) -> Self {
        Self::new(poll.interval(), poll.timeout()).with_retry(retry.clone())
    }

    /// Backoff used when a status check fails transiently
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace interval and timeout, keeping the retry backoff
    pub fn with_ceiling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.interval = interval;
        self.timeout = timeout;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll until the job succeeds, fails or runs out of time.
    ///
    /// The timeout is checked before every status call and sleeps are clipped
    /// to the remaining budget, so no call is made after the ceiling.
    pub async fn wait(
        &self,
        handle: &JobHandle,
        checker: &dyn JobStatusCheck,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        let job_id = handle.job_id.as_str();
        let interval = handle.poll_interval_hint.unwrap_or(self.interval);
        let start = Instant::now();
        let mut polls = 0u32;
        let mut transient_failures = 0u32;

        self.emit(ProgressEvent::Started {
            job_id: job_id.to_string(),
        });

        loop {
            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                self.emit(ProgressEvent::Failed {
                    job_id: job_id.to_string(),
                    error: format!("timed out after {:?}", self.timeout),
                });
                return Err(CoreError::JobTimedOut {
                    job_id: job_id.to_string(),
                    timeout: self.timeout,
                });
            }

            polls += 1;
            let pause = match checker.check(job_id, cancel).await {
                Ok(status) => {
                    transient_failures = 0;
                    let elapsed = start.elapsed();
                    debug!(job_id, status = %status.status, state = %status.state, "Polled job");
                    self.emit(ProgressEvent::Polling {
                        job_id: job_id.to_string(),
                        status: status.status.clone(),
                        elapsed,
                    });

                    match status.state {
                        JobState::Succeeded => {
                            info!(job_id, polls, elapsed_secs = elapsed.as_secs(), "Job succeeded");
                            self.emit(ProgressEvent::Completed {
                                job_id: job_id.to_string(),
                                elapsed,
                            });
                            return Ok(JobOutcome {
                                job_id: job_id.to_string(),
                                payload: status.payload,
                                elapsed,
                                polls,
                            });
                        }
                        JobState::Failed => {
                            let reason = status.failure_reason.unwrap_or_else(|| {
                                format!("job finished with status {}", status.status)
                            });
                            self.emit(ProgressEvent::Failed {
                                job_id: job_id.to_string(),
                                error: reason.clone(),
                            });
                            return Err(CoreError::JobFailed {
                                job_id: job_id.to_string(),
                                reason,
                            });
                        }
                        _ => interval,
                    }
                }
                Err(e) if e.is_retryable() && transient_failures + 1 < self.retry.attempts() => {
                    let delay = self.retry.delay(transient_failures);
                    warn!(
                        job_id,
                        attempt = transient_failures + 1,
                        max_attempts = self.retry.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job status check failed, retrying"
                    );
                    transient_failures += 1;
                    delay
                }
                Err(e) => return Err(e),
            };

            let remaining = self.timeout.saturating_sub(start.elapsed());
            sleep_or_cancel(pause.min(remaining), cancel).await?;
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.on_progress {
            cb(event);
        }
    }
}
