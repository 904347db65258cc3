use async_trait::async_trait;
use thiserror::Error;

use super::models::{
    Branch, CommandExecution, Job, JobStatus, ManageCommand, NewJob, Sandbox, StorageWorkspace,
    TokenInfo,
};
use super::session::ProjectSession;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Retry exhausted after {0} attempts: {1}")]
    RetryExhausted(u32, String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Server-side and transport failures that may clear up on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::RetryExhausted(..) => true,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Branch-aware configuration store: branches, storage workspaces, tokens.
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn verify_token(&self, session: &ProjectSession) -> ApiResult<TokenInfo>;

    async fn get_token(&self, session: &ProjectSession, token_id: &str) -> ApiResult<TokenInfo>;

    async fn list_branches(&self, session: &ProjectSession) -> ApiResult<Vec<Branch>>;

    async fn list_workspaces(
        &self,
        session: &ProjectSession,
        branch_id: &str,
    ) -> ApiResult<Vec<StorageWorkspace>>;

    async fn delete_workspace(
        &self,
        session: &ProjectSession,
        branch_id: &str,
        workspace_id: &str,
        run_async: bool,
    ) -> ApiResult<()>;
}

/// Sandbox registry. `branch_id` of `None` selects the default branch.
#[async_trait]
pub trait SandboxesApi: Send + Sync {
    async fn list_sandboxes(
        &self,
        session: &ProjectSession,
        branch_id: Option<&str>,
    ) -> ApiResult<Vec<Sandbox>>;

    async fn delete_sandbox(&self, session: &ProjectSession, sandbox_id: &str) -> ApiResult<()>;
}

/// Asynchronous job queue.
#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn create_job(&self, session: &ProjectSession, job: &NewJob) -> ApiResult<Job>;

    async fn get_job(&self, session: &ProjectSession, job_id: &str) -> ApiResult<Job>;

    async fn terminate_job(&self, session: &ProjectSession, job_id: &str) -> ApiResult<()>;

    async fn list_jobs(
        &self,
        session: &ProjectSession,
        statuses: &[JobStatus],
        limit: usize,
    ) -> ApiResult<Vec<Job>>;
}

/// Stack-wide maintenance commands, authenticated by a manage token rather
/// than a project's storage token.
#[async_trait]
pub trait ManageApi: Send + Sync {
    async fn run_command(&self, command: &ManageCommand) -> ApiResult<CommandExecution>;
}
