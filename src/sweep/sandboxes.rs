use tracing::{debug, error, info, warn};

use crate::api::models::Sandbox;
use crate::api::session::{PlatformApis, ProjectSession};
use crate::core::config::JanitorConfig;
use crate::core::error::{JanitorError, Result};
use crate::reconcile::sequencer::delete_workspace_idempotent;

use super::models::{SandboxSelection, SandboxSweepStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxSweep {
    pub selection: SandboxSelection,
    pub include_shared: bool,
    pub force: bool,
}

/// Deletes the project's sandboxes, each one's backing storage workspace
/// first. Shared sandboxes are kept unless `include_shared` is set.
pub async fn delete_sandboxes(
    apis: &PlatformApis,
    session: &ProjectSession,
    config: &JanitorConfig,
    sweep: SandboxSweep,
) -> Result<SandboxSweepStats> {
    info!(
        "Starting {} sandbox sweep in project {} (include shared: {}, force: {})",
        sweep.selection, session.project_id, sweep.include_shared, sweep.force
    );
    let mut stats = SandboxSweepStats::new(sweep.selection, !sweep.force);

    let default_branch = default_branch_id(apis, session).await?;
    let sandboxes = apis.sandboxes.list_sandboxes(session, None).await?;
    stats.sandboxes_seen = sandboxes.len();

    for sandbox in &sandboxes {
        if !sweep.include_shared && sandbox.shared {
            debug!("Skipping shared sandbox {}", sandbox.id);
            continue;
        }
        if sandbox.is_deleted() {
            debug!("Skipping already deleted sandbox {}", sandbox.id);
            continue;
        }
        if sweep.selection == SandboxSelection::Ownerless && !is_ownerless(apis, session, sandbox).await? {
            continue;
        }

        let branch_id = sandbox.branch_id.as_deref().unwrap_or(&default_branch);
        match sandbox.backing_workspace_id() {
            Some(workspace_id) if sweep.force => {
                match delete_workspace_idempotent(
                    apis,
                    session,
                    branch_id,
                    workspace_id,
                    config.async_workspace_delete,
                )
                .await
                {
                    Ok(_) => stats.workspaces_deleted += 1,
                    Err(e) => {
                        error!("Error deleting workspace {}: {}", workspace_id, e);
                        stats.failed += 1;
                    }
                }
            }
            Some(workspace_id) => {
                info!("[dry-run] Would delete storage workspace {}", workspace_id);
                stats.workspaces_deleted += 1;
            }
            None => debug!("No underlying storage workspace for sandbox {}", sandbox.id),
        }

        if !sweep.force {
            info!("[dry-run] Would delete sandbox {}", sandbox.id);
            stats.sandboxes_deleted += 1;
            continue;
        }
        info!("Deleting sandbox {}", sandbox.id);
        match apis.sandboxes.delete_sandbox(session, &sandbox.id).await {
            Ok(()) => stats.sandboxes_deleted += 1,
            Err(e) => {
                error!("Error deleting sandbox {}: {}", sandbox.id, e);
                stats.failed += 1;
            }
        }
    }

    info!("Sandbox sweep completed: {}", stats);
    Ok(stats)
}

async fn default_branch_id(apis: &PlatformApis, session: &ProjectSession) -> Result<String> {
    apis.storage
        .list_branches(session)
        .await?
        .into_iter()
        .find(|b| b.is_default)
        .map(|b| b.id)
        .ok_or_else(|| {
            JanitorError::Validation(format!("project {} has no default branch", session.project_id))
        })
}

// Only a 404 for the creating token means "ownerless"; any other error stops the sweep.
async fn is_ownerless(apis: &PlatformApis, session: &ProjectSession, sandbox: &Sandbox) -> Result<bool> {
    let Some(token_id) = sandbox.token_id.as_deref() else {
        warn!("Sandbox {} has no token id, keeping it", sandbox.id);
        return Ok(false);
    };
    match apis.storage.get_token(session, token_id).await {
        Ok(_) => Ok(false),
        Err(e) if e.is_not_found() => {
            debug!("Token {} of sandbox {} no longer exists", token_id, sandbox.id);
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}
