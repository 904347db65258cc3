use async_trait::async_trait;
use tracing::{debug, info};

use super::base::{ApiResult, StorageApi};
use super::client::{RestClient, decode_list, endpoint};
use super::models::{Branch, StorageWorkspace, TokenInfo};
use super::session::ProjectSession;

pub struct StorageClient {
    rest: RestClient,
}

impl StorageClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl StorageApi for StorageClient {
    async fn verify_token(&self, session: &ProjectSession) -> ApiResult<TokenInfo> {
        let url = endpoint(&session.endpoints.connection, "v2/storage/tokens/verify")?;
        self.rest.get_json(session, url).await
    }

    async fn get_token(&self, session: &ProjectSession, token_id: &str) -> ApiResult<TokenInfo> {
        let url = endpoint(
            &session.endpoints.connection,
            &format!("v2/storage/tokens/{}", token_id),
        )?;
        self.rest.get_json(session, url).await
    }

    async fn list_branches(&self, session: &ProjectSession) -> ApiResult<Vec<Branch>> {
        let url = endpoint(&session.endpoints.connection, "v2/storage/dev-branches")?;
        let items: Vec<serde_json::Value> = self.rest.get_json(session, url).await?;
        let branches: Vec<Branch> = decode_list(items, "branch");
        debug!("Project {} has {} branches", session.project_id, branches.len());
        Ok(branches)
    }

    async fn list_workspaces(
        &self,
        session: &ProjectSession,
        branch_id: &str,
    ) -> ApiResult<Vec<StorageWorkspace>> {
        let url = endpoint(
            &session.endpoints.connection,
            &format!("v2/storage/branch/{}/workspaces", branch_id),
        )?;
        let items: Vec<serde_json::Value> = self.rest.get_json(session, url).await?;
        Ok(decode_list(items, "workspace"))
    }

    async fn delete_workspace(
        &self,
        session: &ProjectSession,
        branch_id: &str,
        workspace_id: &str,
        run_async: bool,
    ) -> ApiResult<()> {
        let mut url = endpoint(
            &session.endpoints.connection,
            &format!("v2/storage/branch/{}/workspaces/{}", branch_id, workspace_id),
        )?;
        url.query_pairs_mut()
            .append_pair("async", if run_async { "true" } else { "false" });

        self.rest.delete(session, url).await?;
        info!("Deleted storage workspace {} in branch {}", workspace_id, branch_id);
        Ok(())
    }
}
