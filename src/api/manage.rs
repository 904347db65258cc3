use async_trait::async_trait;
use tracing::info;
use url::Url;

use super::base::{ApiResult, ManageApi};
use super::client::{MANAGE_TOKEN_HEADER, RestClient, endpoint};
use super::models::{CommandExecution, ManageCommand};

pub struct ManageClient {
    rest: RestClient,
    base: Url,
    token: String,
}

impl ManageClient {
    pub fn new(rest: RestClient, base: Url, token: impl Into<String>) -> Self {
        Self {
            rest,
            base,
            token: token.into(),
        }
    }
}

#[async_trait]
impl ManageApi for ManageClient {
    async fn run_command(&self, command: &ManageCommand) -> ApiResult<CommandExecution> {
        let url = endpoint(&self.base, "manage/commands")?;
        let execution: CommandExecution = self
            .rest
            .post_json_as(MANAGE_TOKEN_HEADER, &self.token, url, command)
            .await?;
        info!(
            "Started command {} as execution {}",
            command.command, execution.command_execution_id
        );
        Ok(execution)
    }
}
