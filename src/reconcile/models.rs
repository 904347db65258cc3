use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::models::JobStatus;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletionTarget {
    pub project_id: String,
    pub schema: String,
}

impl DeletionTarget {
    pub fn new(project_id: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            schema: schema.into(),
        }
    }
}

/// Schemas to delete, per project, both in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    projects: Vec<(String, Vec<String>)>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the pair was already present.
    pub fn insert(&mut self, project_id: &str, schema: &str) -> bool {
        let index = match self.projects.iter().position(|(id, _)| id == project_id) {
            Some(index) => index,
            None => {
                self.projects.push((project_id.to_string(), Vec::new()));
                self.projects.len() - 1
            }
        };
        let schemas = &mut self.projects[index].1;
        if schemas.iter().any(|s| s == schema) {
            return false;
        }
        schemas.push(schema.to_string());
        true
    }

    pub fn projects(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.projects
            .iter()
            .map(|(id, schemas)| (id.as_str(), schemas.as_slice()))
    }

    pub fn targets_for(&self, project_id: &str) -> Vec<DeletionTarget> {
        self.projects
            .iter()
            .filter(|(id, _)| id == project_id)
            .flat_map(|(id, schemas)| schemas.iter().map(move |s| DeletionTarget::new(id, s)))
            .collect()
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn len(&self) -> usize {
        self.projects.iter().map(|(_, schemas)| schemas.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceKind {
    /// A sandbox, deleted through an asynchronous job. Its backing storage
    /// workspace, if any, is dropped once that job is terminal.
    SandboxBacked {
        sandbox_id: String,
        backing_workspace_id: Option<String>,
    },
    StorageOnly { workspace_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveResourceRecord {
    pub schema: String,
    pub branch_id: String,
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl LiveResourceRecord {
    pub fn sandbox(
        schema: impl Into<String>,
        branch_id: impl Into<String>,
        sandbox_id: impl Into<String>,
        backing_workspace_id: Option<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            branch_id: branch_id.into(),
            kind: ResourceKind::SandboxBacked {
                sandbox_id: sandbox_id.into(),
                backing_workspace_id,
            },
        }
    }

    pub fn storage(
        schema: impl Into<String>,
        branch_id: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            branch_id: branch_id.into(),
            kind: ResourceKind::StorageOnly {
                workspace_id: workspace_id.into(),
            },
        }
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            ResourceKind::SandboxBacked { sandbox_id, .. } => {
                format!("sandbox {} (branch {})", sandbox_id, self.branch_id)
            }
            ResourceKind::StorageOnly { workspace_id } => {
                format!("workspace {} (branch {})", workspace_id, self.branch_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionJob {
    pub job_id: String,
    pub target: DeletionTarget,
    pub record: LiveResourceRecord,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum DeletionMechanism {
    /// `job_id` is `None` for dry runs.
    Job { job_id: Option<String> },
    DirectCall,
}

impl std::fmt::Display for DeletionMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionMechanism::Job { job_id: Some(id) } => write!(f, "job {}", id),
            DeletionMechanism::Job { job_id: None } => write!(f, "job"),
            DeletionMechanism::DirectCall => write!(f, "direct call"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Deleted {
        mechanism: DeletionMechanism,
        already_gone: bool,
    },
    WouldDelete {
        mechanism: DeletionMechanism,
    },
    Unresolved,
    Failed {
        reason: String,
    },
}

impl ReconciliationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Deleted { .. } => "deleted",
            ReconciliationOutcome::WouldDelete { .. } => "would-delete",
            ReconciliationOutcome::Unresolved => "unresolved",
            ReconciliationOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: DeletionTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<LiveResourceRecord>,
    #[serde(flatten)]
    pub outcome: ReconciliationOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub deleted: usize,
    pub would_delete: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.deleted + self.would_delete + self.unresolved + self.failed
    }

    fn add(&mut self, outcome: &ReconciliationOutcome) {
        match outcome {
            ReconciliationOutcome::Deleted { .. } => self.deleted += 1,
            ReconciliationOutcome::WouldDelete { .. } => self.would_delete += 1,
            ReconciliationOutcome::Unresolved => self.unresolved += 1,
            ReconciliationOutcome::Failed { .. } => self.failed += 1,
        }
    }

    fn merge(&mut self, other: OutcomeCounts) {
        self.deleted += other.deleted;
        self.would_delete += other.would_delete;
        self.unresolved += other.unresolved;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project_id: String,
    pub targets: Vec<TargetReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ProjectReport {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            targets: Vec::new(),
            error: None,
            timed_out: false,
            warnings: Vec::new(),
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for report in &self.targets {
            counts.add(&report.outcome);
        }
        counts
    }

    pub fn outcome_of(&self, schema: &str) -> Option<&ReconciliationOutcome> {
        self.targets
            .iter()
            .find(|r| r.target.schema == schema)
            .map(|r| &r.outcome)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub projects: Vec<ProjectReport>,
}

impl RunReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for project in &self.projects {
            counts.merge(project.counts());
        }
        counts
    }

    pub fn project(&self, project_id: &str) -> Option<&ProjectReport> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }

    pub fn has_timeouts(&self) -> bool {
        self.projects.iter().any(|p| p.timed_out)
    }
}
