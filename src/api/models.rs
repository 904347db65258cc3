use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{EnumString, IntoStaticStr};

/// Sandbox types that run in a container and may own a staging workspace.
/// Every other type is database-backed and owns a physical workspace.
pub const CONTAINER_SANDBOX_TYPES: &[&str] = &[
    "julia",
    "python",
    "python-databricks",
    "python-mlflow",
    "python-snowpark",
    "r",
    "streamlit",
    "test",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceConnection {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceDetails {
    #[serde(default)]
    pub connection: WorkspaceConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type")]
    pub sandbox_type: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub physical_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub staging_workspace_id: Option<String>,
    #[serde(default)]
    pub workspace_details: Option<WorkspaceDetails>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub configuration_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub branch_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub token_id: Option<String>,
    #[serde(default)]
    pub deleted_timestamp: Option<String>,
}

impl Sandbox {
    pub fn is_container(&self) -> bool {
        CONTAINER_SANDBOX_TYPES.contains(&self.sandbox_type.as_str())
    }

    pub fn schema(&self) -> Option<&str> {
        self.workspace_details
            .as_ref()
            .and_then(|d| d.connection.schema.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Storage workspace backing this sandbox: the physical workspace for
    /// database sandboxes, the staging workspace for container sandboxes.
    pub fn backing_workspace_id(&self) -> Option<&str> {
        let id = if self.is_container() {
            self.staging_workspace_id.as_deref()
        } else {
            self.physical_id.as_deref()
        };
        id.filter(|id| !id.is_empty())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_timestamp.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageWorkspace {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub connection: WorkspaceConnection,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl StorageWorkspace {
    pub fn schema(&self) -> Option<&str> {
        self.connection.schema.as_deref().filter(|s| !s.is_empty())
    }

    /// Accepts both RFC 3339 and the colon-less offsets the storage API emits.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Created,
    Waiting,
    Processing,
    Terminating,
    Success,
    Warning,
    Error,
    Terminated,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Warning | Self::Error | Self::Terminated | Self::Cancelled
        )
    }

    pub fn is_successful(self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub is_finished: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub component: String,
    pub mode: String,
    pub config_data: serde_json::Value,
}

impl NewJob {
    pub fn delete_sandbox(component: &str, sandbox_id: &str) -> Self {
        Self {
            component: component.to_string(),
            mode: "run".to_string(),
            config_data: serde_json::json!({
                "parameters": {
                    "task": "delete",
                    "id": sandbox_id,
                }
            }),
        }
    }
}

/// Maintenance command run through the manage API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManageCommand {
    pub command: String,
    pub parameters: Vec<String>,
}

impl ManageCommand {
    pub const DROP_FAILED_WORKSPACES: &'static str =
        "storage:workspace:drop-failed-workspaces-from-metadata";

    /// Forgets workspaces whose backend drop keeps failing. Without `force`
    /// the command itself only reports what it would drop.
    pub fn drop_failed_workspaces(workspace_ids: &[String], force: bool) -> Self {
        let mut parameters = vec!["--ids".to_string(), workspace_ids.join(",")];
        if force {
            parameters.push("--force".to_string());
        }
        Self {
            command: Self::DROP_FAILED_WORKSPACES.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecution {
    #[serde(deserialize_with = "string_or_number")]
    pub command_execution_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenOwner {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: TokenOwner,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

// Ids come back as numbers from some services and strings from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}
