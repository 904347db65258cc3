use tracing::{debug, error, info, warn};

use crate::api::base::ApiResult;
use crate::api::models::{JobStatus, NewJob};
use crate::api::session::{PlatformApis, ProjectSession};
use crate::core::config::JanitorConfig;

use super::matcher::Match;
use super::models::{
    DeletionJob, DeletionMechanism, DeletionTarget, LiveResourceRecord, ReconciliationOutcome,
    ResourceKind, TargetReport,
};

/// What became of one matched target once it was handed to the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Settled(TargetReport),
    /// Job accepted by the queue; the outcome is decided once it is terminal.
    Pending(DeletionJob),
}

/// Deletes storage workspaces directly and sandboxes through queue jobs.
/// With `force` off nothing is mutated and every match reports `WouldDelete`.
pub struct DeletionSequencer<'a> {
    apis: &'a PlatformApis,
    config: &'a JanitorConfig,
    force: bool,
}

impl<'a> DeletionSequencer<'a> {
    pub fn new(apis: &'a PlatformApis, config: &'a JanitorConfig, force: bool) -> Self {
        Self { apis, config, force }
    }

    pub fn is_dry_run(&self) -> bool {
        !self.force
    }

    pub async fn submit(&self, session: &ProjectSession, matched: Match) -> Submission {
        let Match { target, record } = matched;
        match &record.kind {
            ResourceKind::SandboxBacked { sandbox_id, .. } => {
                let sandbox_id = sandbox_id.clone();
                self.submit_sandbox_job(session, target, record, &sandbox_id).await
            }
            ResourceKind::StorageOnly { workspace_id } => {
                let workspace_id = workspace_id.clone();
                Submission::Settled(
                    self.delete_storage_only(session, target, record, &workspace_id).await,
                )
            }
        }
    }

    async fn submit_sandbox_job(
        &self,
        session: &ProjectSession,
        target: DeletionTarget,
        record: LiveResourceRecord,
        sandbox_id: &str,
    ) -> Submission {
        if !self.force {
            info!("[dry-run] Would submit delete job for {} ({})", target.schema, record.describe());
            return Submission::Settled(TargetReport {
                target,
                record: Some(record),
                outcome: ReconciliationOutcome::WouldDelete {
                    mechanism: DeletionMechanism::Job { job_id: None },
                },
            });
        }

        let job = NewJob::delete_sandbox(&self.config.sandbox_component, sandbox_id);
        match self.apis.queue.create_job(session, &job).await {
            Ok(created) => {
                info!(
                    "Submitted job {} deleting sandbox {} ({})",
                    created.id, sandbox_id, target.schema
                );
                Submission::Pending(DeletionJob {
                    job_id: created.id,
                    target,
                    record,
                    status: created.status,
                })
            }
            Err(e) => {
                error!("Failed to submit delete job for sandbox {}: {}", sandbox_id, e);
                Submission::Settled(TargetReport {
                    target,
                    record: Some(record),
                    outcome: ReconciliationOutcome::Failed {
                        reason: format!("job submission failed: {}", e),
                    },
                })
            }
        }
    }

    async fn delete_storage_only(
        &self,
        session: &ProjectSession,
        target: DeletionTarget,
        record: LiveResourceRecord,
        workspace_id: &str,
    ) -> TargetReport {
        if !self.force {
            info!("[dry-run] Would delete workspace {} ({})", workspace_id, target.schema);
            return TargetReport {
                target,
                record: Some(record),
                outcome: ReconciliationOutcome::WouldDelete {
                    mechanism: DeletionMechanism::DirectCall,
                },
            };
        }

        let outcome = match delete_workspace_idempotent(
            self.apis,
            session,
            &record.branch_id,
            workspace_id,
            self.config.async_workspace_delete,
        )
        .await
        {
            Ok(already_gone) => ReconciliationOutcome::Deleted {
                mechanism: DeletionMechanism::DirectCall,
                already_gone,
            },
            Err(e) => {
                error!("Failed to delete workspace {}: {}", workspace_id, e);
                ReconciliationOutcome::Failed {
                    reason: format!("workspace delete failed: {}", e),
                }
            }
        };
        TargetReport {
            target,
            record: Some(record),
            outcome,
        }
    }

    /// Settles a job that reached `status`, then drops the sandbox's backing
    /// workspace. Must only be called with a terminal status.
    pub async fn complete(
        &self,
        session: &ProjectSession,
        job: DeletionJob,
        status: JobStatus,
    ) -> TargetReport {
        let DeletionJob { job_id, target, record, .. } = job;

        let mut outcome = if status.is_successful() {
            info!("Job {} finished with {}, {} deleted", job_id, status, target.schema);
            ReconciliationOutcome::Deleted {
                mechanism: DeletionMechanism::Job {
                    job_id: Some(job_id.clone()),
                },
                already_gone: false,
            }
        } else {
            warn!("Job {} for {} ended with {}", job_id, target.schema, status);
            ReconciliationOutcome::Failed {
                reason: format!("job {} ended with status {}", job_id, status),
            }
        };

        if let ResourceKind::SandboxBacked {
            backing_workspace_id: Some(workspace_id),
            ..
        } = &record.kind
        {
            match delete_workspace_idempotent(
                self.apis,
                session,
                &record.branch_id,
                workspace_id,
                self.config.async_workspace_delete,
            )
            .await
            {
                Ok(_) => debug!("Backing workspace {} of {} removed", workspace_id, target.schema),
                Err(e) => {
                    error!("Failed to delete backing workspace {}: {}", workspace_id, e);
                    if matches!(outcome, ReconciliationOutcome::Deleted { .. }) {
                        outcome = ReconciliationOutcome::Failed {
                            reason: format!(
                                "job {} succeeded but backing workspace {} delete failed: {}",
                                job_id, workspace_id, e
                            ),
                        };
                    }
                }
            }
        }

        TargetReport {
            target,
            record: Some(record),
            outcome,
        }
    }
}

/// Deletes a storage workspace, treating "not found" as already deleted.
/// Returns whether the workspace was already gone.
pub async fn delete_workspace_idempotent(
    apis: &PlatformApis,
    session: &ProjectSession,
    branch_id: &str,
    workspace_id: &str,
    run_async: bool,
) -> ApiResult<bool> {
    info!("Deleting workspace {} in branch {}", workspace_id, branch_id);
    match apis
        .storage
        .delete_workspace(session, branch_id, workspace_id, run_async)
        .await
    {
        Ok(()) => Ok(false),
        Err(e) if e.is_not_found() => {
            warn!("Workspace {} not found, already deleted", workspace_id);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}
