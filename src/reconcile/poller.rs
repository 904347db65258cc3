use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::session::{PlatformApis, ProjectSession};
use crate::core::error::JanitorError;

use super::models::{DeletionJob, ReconciliationOutcome, TargetReport};
use super::sequencer::DeletionSequencer;

/// Time source for the poll loop.
#[async_trait]
pub trait PollClock: Send + Sync {
    async fn sleep(&self, duration: Duration);

    fn now(&self) -> Instant;
}

pub struct TokioClock;

#[async_trait]
impl PollClock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Default)]
pub struct PollOutcome {
    pub reports: Vec<TargetReport>,
    pub timeout: Option<JanitorError>,
}

/// Sweeps every active job once per interval until all are terminal or the
/// optional timeout elapses. Terminal jobs are settled through the sequencer,
/// which also drops their deferred backing workspaces.
pub struct JobPoller<'a> {
    apis: &'a PlatformApis,
    clock: Arc<dyn PollClock>,
    interval: Duration,
    timeout: Option<Duration>,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        apis: &'a PlatformApis,
        clock: Arc<dyn PollClock>,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            apis,
            clock,
            interval,
            timeout,
        }
    }

    pub async fn wait_all(
        &self,
        session: &ProjectSession,
        sequencer: &DeletionSequencer<'_>,
        jobs: Vec<DeletionJob>,
    ) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let mut active = jobs;
        let started = self.clock.now();
        let mut sweep = 0u32;

        while !active.is_empty() {
            sweep += 1;
            debug!("Poll sweep {}: {} active jobs", sweep, active.len());

            let mut still_active = Vec::with_capacity(active.len());
            for mut job in active {
                let job_id = job.job_id.clone();
                match self.apis.queue.get_job(session, &job_id).await {
                    Ok(current) if current.status.is_terminal() => {
                        outcome
                            .reports
                            .push(sequencer.complete(session, job, current.status).await);
                    }
                    Ok(current) => {
                        job.status = current.status;
                        still_active.push(job);
                    }
                    Err(e) if e.is_retryable() => {
                        warn!("Could not read status of job {}, retrying: {}", job_id, e);
                        still_active.push(job);
                    }
                    Err(e) => {
                        let reason = if e.is_not_found() {
                            warn!("Job {} disappeared from the queue", job_id);
                            format!("job {} not found in queue", job_id)
                        } else {
                            warn!("Giving up on job {}: {}", job_id, e);
                            format!("could not read status of job {}: {}", job_id, e)
                        };
                        outcome.reports.push(TargetReport {
                            target: job.target,
                            record: Some(job.record),
                            outcome: ReconciliationOutcome::Failed { reason },
                        });
                    }
                }
            }
            active = still_active;
            if active.is_empty() {
                break;
            }

            let waited = self.clock.now().saturating_duration_since(started);
            if let Some(limit) = self.timeout {
                if waited >= limit {
                    warn!(
                        "Giving up on {} jobs in project {} after {}s",
                        active.len(),
                        session.project_id,
                        waited.as_secs()
                    );
                    outcome.timeout = Some(JanitorError::PollTimeout {
                        project_id: session.project_id.clone(),
                        waited_secs: waited.as_secs(),
                        pending_jobs: active.len(),
                    });
                    for job in active {
                        outcome.reports.push(TargetReport {
                            outcome: ReconciliationOutcome::Failed {
                                reason: format!(
                                    "job {} did not reach a terminal state within {}s (last status {})",
                                    job.job_id,
                                    limit.as_secs(),
                                    job.status
                                ),
                            },
                            target: job.target,
                            record: Some(job.record),
                        });
                    }
                    return outcome;
                }
            }

            info!("Waiting for {} deletion jobs to finish", active.len());
            self.clock.sleep(self.interval).await;
        }

        outcome
    }
}

/// Clock for tests: `sleep` returns at once and advances `now`.
#[cfg(test)]
pub struct ManualClock {
    base: Instant,
    elapsed: parking_lot::Mutex<Duration>,
    sleeps: parking_lot::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: parking_lot::Mutex::new(Duration::ZERO),
            sleeps: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl PollClock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
        self.sleeps.lock().push(duration);
    }

    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock()
    }
}
