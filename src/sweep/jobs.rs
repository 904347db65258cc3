use tracing::{error, info};

use crate::api::models::JobStatus;
use crate::api::session::{PlatformApis, ProjectSession};
use crate::core::error::{JanitorError, Result};

use super::models::TerminateStats;

pub const TERMINATE_LIST_LIMIT: usize = 3000;

pub const TERMINABLE_STATUSES: &[JobStatus] =
    &[JobStatus::Created, JobStatus::Waiting, JobStatus::Processing];

pub fn parse_terminable_status(raw: &str) -> Result<JobStatus> {
    raw.parse::<JobStatus>()
        .ok()
        .filter(|status| TERMINABLE_STATUSES.contains(status))
        .ok_or_else(|| {
            JanitorError::Validation(format!(
                "status must be either \"created\", \"waiting\" or \"processing\", got \"{}\"",
                raw
            ))
        })
}

/// Terminates every project job currently in `status`.
pub async fn terminate_jobs(
    apis: &PlatformApis,
    session: &ProjectSession,
    status: JobStatus,
) -> Result<TerminateStats> {
    if !TERMINABLE_STATUSES.contains(&status) {
        return Err(JanitorError::Validation(format!(
            "jobs in status {} cannot be terminated",
            status
        )));
    }
    info!(
        "Terminating jobs with status \"{}\" in project \"{}\"",
        status, session.project_id
    );

    let jobs = apis
        .queue
        .list_jobs(session, &[status], TERMINATE_LIST_LIMIT)
        .await?;
    let mut stats = TerminateStats {
        status: status.to_string(),
        jobs_found: jobs.len(),
        ..Default::default()
    };

    for job in &jobs {
        match apis.queue.terminate_job(session, &job.id).await {
            Ok(()) => {
                info!("Terminating job \"{}\"", job.id);
                stats.terminated += 1;
            }
            Err(e) => {
                error!("Failed to terminate job {}: {}", job.id, e);
                stats.failed += 1;
            }
        }
    }

    info!("Terminated {} jobs", stats.terminated);
    Ok(stats)
}
