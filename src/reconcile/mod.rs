pub mod inventory;
pub mod manager;
pub mod matcher;
pub mod models;
pub mod poller;
pub mod report;
pub mod sequencer;
pub mod targets;

pub use inventory::collect_inventory;
pub use manager::ReconciliationManager;
pub use matcher::{Match, MatchPlan, match_targets};
pub use models::{
    DeletionJob, DeletionMechanism, DeletionTarget, LiveResourceRecord, OutcomeCounts,
    ProjectReport, ReconciliationOutcome, ResourceKind, RunReport, TargetReport, TargetSet,
};
pub use poller::{JobPoller, PollClock, PollOutcome, TokioClock};
pub use report::{MANUAL_DELETION_MARKER, OutputFormat, render, render_json, render_text};
pub use sequencer::{DeletionSequencer, Submission, delete_workspace_idempotent};
pub use targets::{load_targets, parse_targets};
