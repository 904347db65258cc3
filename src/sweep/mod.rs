pub mod jobs;
pub mod models;
pub mod orphaned;
pub mod sandboxes;

pub use jobs::{TERMINABLE_STATUSES, parse_terminable_status, terminate_jobs};
pub use models::{OrphanStats, SandboxSelection, SandboxSweepStats, TerminateStats};
pub use orphaned::{default_cutoff, delete_orphaned_workspaces, is_orphaned};
pub use sandboxes::{SandboxSweep, delete_sandboxes};
