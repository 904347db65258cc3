//! In-memory platform for tests: scripted inventory and job lifecycles, with
//! every call recorded in order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::config::JanitorConfig;

use super::base::{ApiError, ApiResult, ManageApi, QueueApi, SandboxesApi, StorageApi};
use super::models::{
    Branch, CommandExecution, Job, JobStatus, ManageCommand, NewJob, Sandbox, StorageWorkspace,
    TokenInfo, TokenOwner, WorkspaceConnection, WorkspaceDetails,
};
use super::session::{PlatformApis, ProjectSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListBranches,
    ListSandboxes(Option<String>),
    ListWorkspaces(String),
    CreateJob { sandbox_id: String, job_id: String },
    GetJob { job_id: String, status: JobStatus },
    TerminateJob(String),
    DeleteWorkspace { branch_id: String, workspace_id: String },
    DeleteSandbox(String),
    RunCommand { command: String, parameters: Vec<String> },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateJob { .. }
                | Call::TerminateJob(_)
                | Call::DeleteWorkspace { .. }
                | Call::DeleteSandbox(_)
                | Call::RunCommand { .. }
        )
    }
}

#[derive(Default)]
struct FakeState {
    token_owner: Option<String>,
    live_tokens: HashSet<String>,
    branches: Vec<Branch>,
    sandboxes: HashMap<Option<String>, Vec<Sandbox>>,
    workspaces: HashMap<String, Vec<StorageWorkspace>>,
    missing_workspaces: HashSet<String>,
    failing_workspaces: HashSet<String>,
    failing_sandbox_branches: HashSet<String>,
    fail_branch_listing: bool,
    fail_create_job: bool,
    job_scripts: VecDeque<Vec<JobStatus>>,
    job_status_errors: VecDeque<u16>,
    jobs: HashMap<String, VecDeque<JobStatus>>,
    next_job_id: u64,
    listed_jobs: Vec<Job>,
    failing_terminations: HashSet<String>,
    calls: Vec<Call>,
}

pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_job_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with_branch(self, id: &str, is_default: bool) -> Self {
        self.state.lock().branches.push(Branch {
            id: id.to_string(),
            name: if is_default { "Main".to_string() } else { format!("dev-{}", id) },
            is_default,
        });
        self
    }

    /// `branch` of `None` registers the sandbox on the default branch.
    pub fn with_sandbox(self, branch: Option<&str>, mut sandbox: Sandbox) -> Self {
        sandbox.branch_id = branch.map(str::to_string);
        self.state
            .lock()
            .sandboxes
            .entry(branch.map(str::to_string))
            .or_default()
            .push(sandbox);
        self
    }

    pub fn with_workspace(self, branch: &str, workspace: StorageWorkspace) -> Self {
        self.state
            .lock()
            .workspaces
            .entry(branch.to_string())
            .or_default()
            .push(workspace);
        self
    }

    /// Status sequence for the next created job; the last status repeats.
    pub fn with_job_script(self, statuses: &[JobStatus]) -> Self {
        self.state.lock().job_scripts.push_back(statuses.to_vec());
        self
    }

    /// HTTP statuses returned by the next `get_job` calls, one per call,
    /// before the job scripts are consulted.
    pub fn with_job_status_errors(self, statuses: &[u16]) -> Self {
        self.state.lock().job_status_errors.extend(statuses.iter().copied());
        self
    }

    pub fn with_token_owner(self, project_id: &str) -> Self {
        self.state.lock().token_owner = Some(project_id.to_string());
        self
    }

    pub fn with_live_token(self, token_id: &str) -> Self {
        self.state.lock().live_tokens.insert(token_id.to_string());
        self
    }

    pub fn with_missing_workspace(self, workspace_id: &str) -> Self {
        self.state.lock().missing_workspaces.insert(workspace_id.to_string());
        self
    }

    pub fn with_failing_workspace(self, workspace_id: &str) -> Self {
        self.state.lock().failing_workspaces.insert(workspace_id.to_string());
        self
    }

    pub fn with_failing_sandbox_listing(self, branch_id: &str) -> Self {
        self.state
            .lock()
            .failing_sandbox_branches
            .insert(branch_id.to_string());
        self
    }

    pub fn with_failing_branch_listing(self) -> Self {
        self.state.lock().fail_branch_listing = true;
        self
    }

    pub fn with_failing_job_creation(self) -> Self {
        self.state.lock().fail_create_job = true;
        self
    }

    pub fn with_listed_job(self, job_id: &str, status: JobStatus) -> Self {
        self.state.lock().listed_jobs.push(Job {
            id: job_id.to_string(),
            status,
            is_finished: status.is_terminal(),
        });
        self
    }

    pub fn with_failing_termination(self, job_id: &str) -> Self {
        self.state.lock().failing_terminations.insert(job_id.to_string());
        self
    }

    pub fn into_apis(self) -> (Arc<Self>, PlatformApis) {
        let platform = Arc::new(self);
        let apis = PlatformApis::new(platform.clone(), platform.clone(), platform.clone());
        (platform, apis)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

pub fn session(project_id: &str) -> ProjectSession {
    let endpoints = JanitorConfig::default()
        .endpoints()
        .unwrap_or_else(|e| panic!("default endpoints: {}", e));
    ProjectSession::new(project_id, format!("{}-token", project_id), endpoints)
}

pub fn db_sandbox(id: &str, schema: &str, physical_id: &str) -> Sandbox {
    Sandbox {
        id: id.to_string(),
        sandbox_type: "snowflake".to_string(),
        shared: false,
        physical_id: Some(physical_id.to_string()),
        staging_workspace_id: None,
        workspace_details: Some(WorkspaceDetails {
            connection: WorkspaceConnection {
                schema: Some(schema.to_string()),
                backend: Some("snowflake".to_string()),
            },
        }),
        configuration_id: Some(format!("cfg-{}", id)),
        branch_id: None,
        token_id: Some(format!("tok-{}", id)),
        deleted_timestamp: None,
    }
}

pub fn container_sandbox(id: &str, schema: Option<&str>, staging_id: Option<&str>) -> Sandbox {
    Sandbox {
        id: id.to_string(),
        sandbox_type: "python".to_string(),
        shared: false,
        physical_id: None,
        staging_workspace_id: staging_id.map(str::to_string),
        workspace_details: schema.map(|schema| WorkspaceDetails {
            connection: WorkspaceConnection {
                schema: Some(schema.to_string()),
                backend: Some("snowflake".to_string()),
            },
        }),
        configuration_id: None,
        branch_id: None,
        token_id: Some(format!("tok-{}", id)),
        deleted_timestamp: None,
    }
}

pub fn workspace(id: &str, schema: &str) -> StorageWorkspace {
    StorageWorkspace {
        id: id.to_string(),
        connection: WorkspaceConnection {
            schema: Some(schema.to_string()),
            backend: Some("snowflake".to_string()),
        },
        component: None,
        created: None,
    }
}

#[async_trait]
impl StorageApi for FakePlatform {
    async fn verify_token(&self, session: &ProjectSession) -> ApiResult<TokenInfo> {
        let owner = self
            .state
            .lock()
            .token_owner
            .clone()
            .unwrap_or_else(|| session.project_id.clone());
        Ok(TokenInfo {
            id: "1".to_string(),
            description: Some("fake".to_string()),
            owner: TokenOwner {
                id: owner,
                name: None,
            },
        })
    }

    async fn get_token(&self, _session: &ProjectSession, token_id: &str) -> ApiResult<TokenInfo> {
        if self.state.lock().live_tokens.contains(token_id) {
            Ok(TokenInfo {
                id: token_id.to_string(),
                description: None,
                owner: TokenOwner {
                    id: "1".to_string(),
                    name: None,
                },
            })
        } else {
            Err(ApiError::NotFound(format!("token {}", token_id)))
        }
    }

    async fn list_branches(&self, _session: &ProjectSession) -> ApiResult<Vec<Branch>> {
        self.record(Call::ListBranches);
        let state = self.state.lock();
        if state.fail_branch_listing {
            return Err(ApiError::Status {
                status: 500,
                body: "branches unavailable".to_string(),
            });
        }
        Ok(state.branches.clone())
    }

    async fn list_workspaces(
        &self,
        _session: &ProjectSession,
        branch_id: &str,
    ) -> ApiResult<Vec<StorageWorkspace>> {
        self.record(Call::ListWorkspaces(branch_id.to_string()));
        Ok(self
            .state
            .lock()
            .workspaces
            .get(branch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_workspace(
        &self,
        _session: &ProjectSession,
        branch_id: &str,
        workspace_id: &str,
        _run_async: bool,
    ) -> ApiResult<()> {
        self.record(Call::DeleteWorkspace {
            branch_id: branch_id.to_string(),
            workspace_id: workspace_id.to_string(),
        });
        let mut state = self.state.lock();
        if state.failing_workspaces.contains(workspace_id) {
            return Err(ApiError::Status {
                status: 500,
                body: format!("backend refused to drop {}", workspace_id),
            });
        }
        if state.missing_workspaces.contains(workspace_id) {
            return Err(ApiError::NotFound(format!("workspace {}", workspace_id)));
        }
        state.missing_workspaces.insert(workspace_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl SandboxesApi for FakePlatform {
    async fn list_sandboxes(
        &self,
        _session: &ProjectSession,
        branch_id: Option<&str>,
    ) -> ApiResult<Vec<Sandbox>> {
        self.record(Call::ListSandboxes(branch_id.map(str::to_string)));
        let state = self.state.lock();
        if let Some(branch_id) = branch_id {
            if state.failing_sandbox_branches.contains(branch_id) {
                return Err(ApiError::Status {
                    status: 503,
                    body: "sandboxes unavailable".to_string(),
                });
            }
        }
        Ok(state
            .sandboxes
            .get(&branch_id.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_sandbox(&self, _session: &ProjectSession, sandbox_id: &str) -> ApiResult<()> {
        self.record(Call::DeleteSandbox(sandbox_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl QueueApi for FakePlatform {
    async fn create_job(&self, _session: &ProjectSession, job: &NewJob) -> ApiResult<Job> {
        let sandbox_id = job.config_data["parameters"]["id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let mut state = self.state.lock();
        if state.fail_create_job {
            drop(state);
            self.record(Call::CreateJob {
                sandbox_id,
                job_id: String::new(),
            });
            return Err(ApiError::Status {
                status: 422,
                body: "queue rejected job".to_string(),
            });
        }

        state.next_job_id += 1;
        let job_id = state.next_job_id.to_string();
        let script = state
            .job_scripts
            .pop_front()
            .unwrap_or_else(|| vec![JobStatus::Processing, JobStatus::Success]);
        state.jobs.insert(job_id.clone(), script.into_iter().collect());
        state.calls.push(Call::CreateJob {
            sandbox_id,
            job_id: job_id.clone(),
        });

        Ok(Job {
            id: job_id,
            status: JobStatus::Created,
            is_finished: false,
        })
    }

    async fn get_job(&self, _session: &ProjectSession, job_id: &str) -> ApiResult<Job> {
        let mut state = self.state.lock();
        if let Some(status) = state.job_status_errors.pop_front() {
            return Err(ApiError::Status {
                status,
                body: format!("cannot read job {}", job_id),
            });
        }
        let script = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ApiError::NotFound(format!("job {}", job_id)))?;
        let status = if script.len() > 1 {
            script.pop_front().unwrap_or(JobStatus::Processing)
        } else {
            script.front().copied().unwrap_or(JobStatus::Success)
        };
        state.calls.push(Call::GetJob {
            job_id: job_id.to_string(),
            status,
        });

        Ok(Job {
            id: job_id.to_string(),
            status,
            is_finished: status.is_terminal(),
        })
    }

    async fn terminate_job(&self, _session: &ProjectSession, job_id: &str) -> ApiResult<()> {
        self.record(Call::TerminateJob(job_id.to_string()));
        if self.state.lock().failing_terminations.contains(job_id) {
            return Err(ApiError::Status {
                status: 400,
                body: format!("job {} already finished", job_id),
            });
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        _session: &ProjectSession,
        statuses: &[JobStatus],
        limit: usize,
    ) -> ApiResult<Vec<Job>> {
        Ok(self
            .state
            .lock()
            .listed_jobs
            .iter()
            .filter(|job| statuses.contains(&job.status))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ManageApi for FakePlatform {
    async fn run_command(&self, command: &ManageCommand) -> ApiResult<CommandExecution> {
        self.record(Call::RunCommand {
            command: command.command.clone(),
            parameters: command.parameters.clone(),
        });
        Ok(CommandExecution {
            command_execution_id: "cmd-1".to_string(),
        })
    }
}
