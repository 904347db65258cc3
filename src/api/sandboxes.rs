use async_trait::async_trait;
use tracing::{debug, info};

use super::base::{ApiResult, SandboxesApi};
use super::client::{RestClient, decode_list, endpoint};
use super::models::Sandbox;
use super::session::ProjectSession;

pub struct SandboxesClient {
    rest: RestClient,
}

impl SandboxesClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl SandboxesApi for SandboxesClient {
    async fn list_sandboxes(
        &self,
        session: &ProjectSession,
        branch_id: Option<&str>,
    ) -> ApiResult<Vec<Sandbox>> {
        let mut url = endpoint(&session.endpoints.sandboxes, "sandboxes")?;
        if let Some(branch_id) = branch_id {
            url.query_pairs_mut().append_pair("branchId", branch_id);
        }

        let items: Vec<serde_json::Value> = self.rest.get_json(session, url).await?;
        let sandboxes: Vec<Sandbox> = decode_list(items, "sandbox");
        debug!(
            "Project {} branch {} has {} sandboxes",
            session.project_id,
            branch_id.unwrap_or("default"),
            sandboxes.len()
        );
        Ok(sandboxes)
    }

    async fn delete_sandbox(&self, session: &ProjectSession, sandbox_id: &str) -> ApiResult<()> {
        let url = endpoint(&session.endpoints.sandboxes, &format!("sandboxes/{}", sandbox_id))?;
        self.rest.delete(session, url).await?;
        info!("Deleted sandbox {}", sandbox_id);
        Ok(())
    }
}
