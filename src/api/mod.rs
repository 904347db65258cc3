pub mod base;
pub mod client;
pub mod manage;
pub mod models;
pub mod queue;
pub mod sandboxes;
pub mod session;
pub mod storage;

#[cfg(test)]
pub mod fake;

pub use base::{ApiError, ApiResult, ManageApi, QueueApi, SandboxesApi, StorageApi};
pub use client::RestClient;
pub use manage::ManageClient;
pub use models::{
    Branch, CommandExecution, Job, JobStatus, ManageCommand, NewJob, Sandbox, StorageWorkspace,
    TokenInfo,
};
pub use queue::QueueClient;
pub use sandboxes::SandboxesClient;
pub use session::{PlatformApis, ProjectSession};
pub use storage::StorageClient;
