use chrono::{DateTime, Months, Utc};
use tracing::{debug, error, info};

use crate::api::base::ManageApi;
use crate::api::models::{ManageCommand, StorageWorkspace};
use crate::api::session::{PlatformApis, ProjectSession};
use crate::core::error::{JanitorError, Result};
use crate::reconcile::sequencer::delete_workspace_idempotent;

use super::models::OrphanStats;

/// Default cutoff: anything created more than a month ago.
pub fn default_cutoff(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now.checked_sub_months(Months::new(1))
        .ok_or_else(|| JanitorError::Validation(format!("cannot compute cutoff from {}", now)))
}

pub fn is_orphaned(workspace: &StorageWorkspace, component: &str, until: DateTime<Utc>) -> bool {
    workspace.component.as_deref() == Some(component)
        && workspace.created_at().is_some_and(|created| created < until)
}

/// Deletes storage workspaces of `component` created before `until`, in every
/// branch. Delete failures are counted and never stop the sweep.
///
/// With `manage` set the orphans are not deleted one by one: their ids are
/// collected and passed in a single drop-failed-workspaces command, which also
/// clears workspaces whose backend drop keeps failing.
pub async fn delete_orphaned_workspaces(
    apis: &PlatformApis,
    session: &ProjectSession,
    component: &str,
    until: DateTime<Utc>,
    force: bool,
    manage: Option<&dyn ManageApi>,
) -> Result<OrphanStats> {
    info!(
        "Starting orphan sweep of {} workspaces created before {} (force: {})",
        component, until, force
    );

    let mut stats = OrphanStats::new(component, until, !force);
    let mut hand_off = Vec::new();

    let branches = apis.storage.list_branches(session).await?;
    for branch in &branches {
        let workspaces = apis.storage.list_workspaces(session, &branch.id).await?;
        info!("Found {} workspaces in branch {}", workspaces.len(), branch.name);
        stats.workspaces_seen += workspaces.len();

        for workspace in &workspaces {
            if !is_orphaned(workspace, component, until) {
                debug!(
                    "Skipping workspace {} (component {:?}, created {:?})",
                    workspace.id, workspace.component, workspace.created
                );
                continue;
            }

            stats.orphans_found += 1;
            if manage.is_some() {
                hand_off.push(workspace.id.clone());
                continue;
            }
            if !force {
                info!(
                    "[dry-run] Would delete orphaned workspace {} created {:?}",
                    workspace.id, workspace.created
                );
                continue;
            }

            match delete_workspace_idempotent(apis, session, &branch.id, &workspace.id, false).await {
                Ok(_) => stats.deleted += 1,
                Err(e) => {
                    error!("Error deleting workspace {}: {}", workspace.id, e);
                    stats.failed += 1;
                }
            }
        }
    }

    if let Some(manage) = manage {
        if !hand_off.is_empty() {
            stats.handed_off = hand_off.len();
            if force {
                let command = ManageCommand::drop_failed_workspaces(&hand_off, true);
                let execution = manage.run_command(&command).await?;
                info!(
                    "Dropping {} orphaned workspaces through command execution {}",
                    hand_off.len(),
                    execution.command_execution_id
                );
                stats.command_execution_id = Some(execution.command_execution_id);
            } else {
                info!(
                    "[dry-run] Would drop orphaned workspaces {} through the manage API",
                    hand_off.join(",")
                );
            }
        }
    }

    info!("Orphan sweep completed: {}", stats);
    Ok(stats)
}
