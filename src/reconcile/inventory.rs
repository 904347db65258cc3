use std::collections::HashSet;

use tracing::{debug, info};

use crate::api::base::ApiResult;
use crate::api::models::{Branch, Sandbox};
use crate::api::session::{PlatformApis, ProjectSession};

use super::models::LiveResourceRecord;

/// Read-only snapshot of every schema-bearing resource in a project. Sandboxes
/// of all branches come first, in branch order, then the storage workspaces
/// not backing any of them, so a claim from a later branch still applies.
pub async fn collect_inventory(
    apis: &PlatformApis,
    session: &ProjectSession,
) -> ApiResult<Vec<LiveResourceRecord>> {
    let branches = apis.storage.list_branches(session).await?;
    let mut records = Vec::new();
    let mut claimed_workspaces = HashSet::new();
    let mut listed_workspaces = Vec::with_capacity(branches.len());

    for branch in &branches {
        info!(
            "Checking branch {} ({}) of project {} for sandboxes and workspaces",
            branch.id, branch.name, session.project_id
        );
        let sandbox_filter = (!branch.is_default).then_some(branch.id.as_str());

        let (sandboxes, workspaces) = futures::try_join!(
            apis.sandboxes.list_sandboxes(session, sandbox_filter),
            apis.storage.list_workspaces(session, &branch.id),
        )?;

        for sandbox in sandboxes.iter().filter(|s| belongs_to(s, branch)) {
            if sandbox.is_deleted() {
                debug!("Skipping deleted sandbox {}", sandbox.id);
                continue;
            }
            let Some(schema) = sandbox.schema() else {
                debug!("Sandbox {} has no workspace schema, not matchable", sandbox.id);
                continue;
            };
            let backing = sandbox.backing_workspace_id().map(str::to_string);
            if let Some(id) = &backing {
                claimed_workspaces.insert(id.clone());
            }
            records.push(LiveResourceRecord::sandbox(schema, &branch.id, &sandbox.id, backing));
        }
        listed_workspaces.push((branch, workspaces));
    }

    for (branch, workspaces) in &listed_workspaces {
        for workspace in workspaces {
            if claimed_workspaces.contains(&workspace.id) {
                debug!("Workspace {} backs a sandbox, covered by its record", workspace.id);
                continue;
            }
            let Some(schema) = workspace.schema() else {
                debug!("Workspace {} has no schema, not matchable", workspace.id);
                continue;
            };
            records.push(LiveResourceRecord::storage(schema, &branch.id, &workspace.id));
        }
    }

    info!(
        "Project {}: {} live records across {} branches",
        session.project_id,
        records.len(),
        branches.len()
    );
    Ok(records)
}

// The default-branch listing may also carry sandboxes of dev branches.
fn belongs_to(sandbox: &Sandbox, branch: &Branch) -> bool {
    match sandbox.branch_id.as_deref() {
        None => branch.is_default,
        Some(id) => id == branch.id,
    }
}
