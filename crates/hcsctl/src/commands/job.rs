//! Job waiting with a terminal spinner

use crate::cli::{JobCommands, OutputFormat};
use crate::error::Result as CliResult;
use crate::output;
use hcsctl_core::{HcsClient, JobOutcome, JobPoller, ProgressCallback, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub async fn handle_job_command(
    job_cmd: &JobCommands,
    client: &HcsClient,
    region: Option<&str>,
    output_format: OutputFormat,
) -> CliResult<()> {
    match job_cmd {
        JobCommands::Wait {
            product,
            job_id,
            timeout,
            interval,
        } => {
            let poller = poller_with_overrides(client.poller(), *interval, *timeout);
            let outcome = wait_with_progress(client, product, region, job_id, poller).await?;
            output::print_output(
                outcome_json(&outcome),
                output_format.resolve(output::OutputFormat::Json),
            )?;
            Ok(())
        }
    }
}

fn poller_with_overrides(
    base: JobPoller,
    interval: Option<u64>,
    timeout: Option<u64>,
) -> JobPoller {
    if interval.is_none() && timeout.is_none() {
        return base;
    }
    let interval = interval.map_or(base.interval(), Duration::from_secs);
    let timeout = timeout.map_or(base.timeout(), Duration::from_secs);
    base.with_ceiling(interval, timeout)
}

/// Wait for a job, showing a spinner on stderr
pub async fn wait_with_progress(
    client: &HcsClient,
    product: &str,
    region: Option<&str>,
    job_id: &str,
    poller: JobPoller,
) -> CliResult<JobOutcome> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(format!("Waiting for {} job {}", product, job_id));
    pb.enable_steady_tick(Duration::from_millis(100));

    let poller = poller.on_progress(progress_callback(pb.clone()));
    let result = client.wait_job(product, region, job_id, &poller).await;

    match &result {
        Ok(outcome) => {
            debug!(job_id, polls = outcome.polls, "Job finished");
            pb.finish_with_message(format!(
                "Job {} completed in {:.1}s",
                job_id,
                outcome.elapsed.as_secs_f64()
            ));
        }
        Err(_) => pb.abandon(),
    }

    Ok(result?)
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn progress_callback(pb: ProgressBar) -> ProgressCallback {
    Box::new(move |event| match event {
        ProgressEvent::Started { job_id } => {
            pb.set_message(format!("Job {} started", job_id));
        }
        ProgressEvent::Polling {
            job_id,
            status,
            elapsed,
        } => {
            pb.set_message(format!(
                "Job {}: {} ({}s)",
                job_id,
                status,
                elapsed.as_secs()
            ));
        }
        ProgressEvent::Completed { job_id, .. } => {
            pb.set_message(format!("Job {} completed", job_id));
        }
        ProgressEvent::Failed { job_id, error } => {
            pb.set_message(format!("Job {} failed: {}", job_id, error));
        }
    })
}

/// Printable form of a finished job
pub fn outcome_json(outcome: &JobOutcome) -> serde_json::Value {
    json!({
        "job_id": outcome.job_id,
        "elapsed_secs": outcome.elapsed.as_secs_f64(),
        "polls": outcome.polls,
        "result": outcome.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_overrides() {
        let base = JobPoller::new(Duration::from_secs(3), Duration::from_secs(90));
        let unchanged = poller_with_overrides(base, None, None);
        assert_eq!(unchanged.timeout(), Duration::from_secs(90));

        let base = JobPoller::new(Duration::from_secs(3), Duration::from_secs(90));
        let longer = poller_with_overrides(base, None, Some(600));
        assert_eq!(longer.timeout(), Duration::from_secs(600));
        assert_eq!(longer.interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_outcome_json() {
        let outcome = JobOutcome {
            job_id: "job-1".to_string(),
            payload: json!({"job_id": "job-1", "status": "SUCCESS"}),
            elapsed: Duration::from_millis(1500),
            polls: 3,
        };
        let value = outcome_json(&outcome);
        assert_eq!(value["polls"], 3);
        assert_eq!(value["elapsed_secs"], 1.5);
        assert_eq!(value["result"]["status"], "SUCCESS");
    }
}
