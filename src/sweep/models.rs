use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrphanStats {
    pub component: String,
    pub until: DateTime<Utc>,
    pub workspaces_seen: usize,
    pub orphans_found: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Orphans passed to the drop-failed-workspaces command instead of being
    /// deleted one by one.
    #[serde(default)]
    pub handed_off: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_execution_id: Option<String>,
    pub dry_run: bool,
}

impl OrphanStats {
    pub fn new(component: &str, until: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            component: component.to_string(),
            until,
            workspaces_seen: 0,
            orphans_found: 0,
            deleted: 0,
            failed: 0,
            handed_off: 0,
            command_execution_id: None,
            dry_run,
        }
    }
}

impl fmt::Display for OrphanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Of {} workspaces found, {} {} orphans created before {}: {} deleted, {} failed",
            self.workspaces_seen,
            self.orphans_found,
            self.component,
            self.until.to_rfc3339(),
            self.deleted,
            self.failed,
        )?;
        if self.handed_off > 0 {
            match &self.command_execution_id {
                Some(id) => write!(f, ", {} handed to command execution {}", self.handed_off, id)?,
                None => write!(f, ", {} would be handed to the drop command", self.handed_off)?,
            }
        }
        f.write_str(dry_run_suffix(self.dry_run))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SandboxSelection {
    /// Every live sandbox of the project.
    All,
    /// Only sandboxes whose creating token no longer exists.
    Ownerless,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxSweepStats {
    pub selection: SandboxSelection,
    pub sandboxes_seen: usize,
    pub sandboxes_deleted: usize,
    pub workspaces_deleted: usize,
    pub failed: usize,
    pub dry_run: bool,
}

impl SandboxSweepStats {
    pub fn new(selection: SandboxSelection, dry_run: bool) -> Self {
        Self {
            selection,
            sandboxes_seen: 0,
            sandboxes_deleted: 0,
            workspaces_deleted: 0,
            failed: 0,
            dry_run,
        }
    }
}

impl fmt::Display for SandboxSweepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sandboxes deleted and {} storage workspaces deleted ({} seen, {} failed){}",
            self.sandboxes_deleted,
            self.workspaces_deleted,
            self.sandboxes_seen,
            self.failed,
            dry_run_suffix(self.dry_run)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminateStats {
    pub status: String,
    pub jobs_found: usize,
    pub terminated: usize,
    pub failed: usize,
}

impl fmt::Display for TerminateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} jobs found: {} terminated, {} failed",
            self.jobs_found, self.status, self.terminated, self.failed
        )
    }
}

fn dry_run_suffix(dry_run: bool) -> &'static str {
    if dry_run { " [dry-run, nothing deleted]" } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_stats_display() {
        let mut stats = SandboxSweepStats::new(SandboxSelection::Ownerless, true);
        stats.sandboxes_seen = 4;
        stats.sandboxes_deleted = 2;
        stats.workspaces_deleted = 1;
        assert_eq!(
            stats.to_string(),
            "2 sandboxes deleted and 1 storage workspaces deleted (4 seen, 0 failed) [dry-run, nothing deleted]"
        );
        assert_eq!(
            serde_json::to_value(&stats).unwrap()["selection"],
            "ownerless"
        );
    }

    #[test]
    fn test_orphan_stats_display_with_hand_off() {
        let until = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut stats = OrphanStats::new("keboola.sandboxes", until, false);
        stats.workspaces_seen = 5;
        stats.orphans_found = 2;
        stats.handed_off = 2;
        stats.command_execution_id = Some("4411".into());
        assert_eq!(
            stats.to_string(),
            "Of 5 workspaces found, 2 keboola.sandboxes orphans created before 2024-06-01T00:00:00+00:00: \
             0 deleted, 0 failed, 2 handed to command execution 4411"
        );

        let plain = OrphanStats::new("keboola.sandboxes", until, true);
        assert!(serde_json::to_value(&plain).unwrap().get("command_execution_id").is_none());
    }

    #[test]
    fn test_terminate_stats_display() {
        let stats = TerminateStats {
            status: "waiting".into(),
            jobs_found: 3,
            terminated: 2,
            failed: 1,
        };
        assert_eq!(stats.to_string(), "3 waiting jobs found: 2 terminated, 1 failed");
    }
}
