use std::fmt;
use std::sync::Arc;

use crate::core::config::{Endpoints, JanitorConfig};
use crate::core::error::Result;
use crate::utils::token_fingerprint;

use super::base::{QueueApi, SandboxesApi, StorageApi};
use super::client::RestClient;
use super::queue::QueueClient;
use super::sandboxes::SandboxesClient;
use super::storage::StorageClient;

/// Everything needed to act on one project: its id, its storage token and the
/// service endpoints. Passed explicitly into every API call.
#[derive(Clone)]
pub struct ProjectSession {
    pub project_id: String,
    token: String,
    pub endpoints: Endpoints,
}

impl ProjectSession {
    pub fn new(project_id: impl Into<String>, token: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            project_id: project_id.into(),
            token: token.into(),
            endpoints,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.token)
    }
}

impl fmt::Debug for ProjectSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSession")
            .field("project_id", &self.project_id)
            .field("token", &format_args!("<{}>", self.fingerprint()))
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// The three collaborators the engine and sweeps depend on.
#[derive(Clone)]
pub struct PlatformApis {
    pub storage: Arc<dyn StorageApi>,
    pub sandboxes: Arc<dyn SandboxesApi>,
    pub queue: Arc<dyn QueueApi>,
}

impl PlatformApis {
    pub fn new(
        storage: Arc<dyn StorageApi>,
        sandboxes: Arc<dyn SandboxesApi>,
        queue: Arc<dyn QueueApi>,
    ) -> Self {
        Self {
            storage,
            sandboxes,
            queue,
        }
    }

    /// HTTP-backed collaborators sharing one connection pool.
    pub fn http(config: &JanitorConfig) -> Result<Self> {
        let rest = RestClient::new(config.timeout_secs, config.max_retries)?;
        Ok(Self {
            storage: Arc::new(StorageClient::new(rest.clone())),
            sandboxes: Arc::new(SandboxesClient::new(rest.clone())),
            queue: Arc::new(QueueClient::new(rest)),
        })
    }
}
