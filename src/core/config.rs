use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{JanitorError, Result};

pub const DEFAULT_STACK_SUFFIX: &str = "keboola.com";

pub const DEFAULT_WORKSPACE_PREFIX: &str = "WORKSPACE_";

pub const DEFAULT_SANDBOX_COMPONENT: &str = "keboola.sandboxes";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    pub stack_suffix: String,
    pub connection_url: Option<String>,
    pub sandboxes_url: Option<String>,
    pub queue_url: Option<String>,

    pub timeout_secs: u64,
    pub max_retries: u32,

    pub poll_interval_secs: u64,
    pub poll_timeout_secs: Option<u64>,

    pub workspace_prefix: String,
    pub sandbox_component: String,
    pub async_workspace_delete: bool,
}

/// Base URLs of the three services a project session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub connection: Url,
    pub sandboxes: Url,
    pub queue: Url,
}

impl JanitorConfig {
    pub fn new(stack_suffix: &str) -> Self {
        Self {
            stack_suffix: stack_suffix.to_string(),
            connection_url: None,
            sandboxes_url: None,
            queue_url: None,

            timeout_secs: 60,
            max_retries: 3,

            poll_interval_secs: 2,
            poll_timeout_secs: None,

            workspace_prefix: DEFAULT_WORKSPACE_PREFIX.to_string(),
            sandbox_component: DEFAULT_SANDBOX_COMPONENT.to_string(),
            async_workspace_delete: true,
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::new(
            &std::env::var("JANITOR_STACK_SUFFIX").unwrap_or_else(|_| DEFAULT_STACK_SUFFIX.to_string()),
        );

        if let Ok(url) = std::env::var("JANITOR_CONNECTION_URL") {
            config.connection_url = Some(url);
        }
        if let Ok(url) = std::env::var("JANITOR_SANDBOXES_URL") {
            config.sandboxes_url = Some(url);
        }
        if let Ok(url) = std::env::var("JANITOR_QUEUE_URL") {
            config.queue_url = Some(url);
        }
        if let Some(secs) = std::env::var("JANITOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = std::env::var("JANITOR_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.poll_timeout_secs = Some(secs);
        }

        config
    }

    /// Layers an optional config file under `JANITOR_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(config_error)?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(config::Environment::with_prefix("JANITOR").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)
    }

    pub fn with_stack_suffix(mut self, stack_suffix: &str) -> Self {
        self.stack_suffix = stack_suffix.to_string();
        self
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        Ok(Endpoints {
            connection: self.service_url("connection", self.connection_url.as_deref())?,
            sandboxes: self.service_url("sandboxes", self.sandboxes_url.as_deref())?,
            queue: self.service_url("queue", self.queue_url.as_deref())?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stack_suffix.trim().is_empty() {
            return Err(JanitorError::Configuration("stack suffix is empty".into()));
        }
        if self.workspace_prefix.is_empty() {
            return Err(JanitorError::Configuration("workspace prefix is empty".into()));
        }
        if self.max_retries == 0 {
            return Err(JanitorError::Configuration("max_retries must be at least 1".into()));
        }
        self.endpoints().map(|_| ())
    }

    fn service_url(&self, service: &str, explicit: Option<&str>) -> Result<Url> {
        let raw = match explicit {
            Some(url) => url.to_string(),
            None => format!("https://{}.{}", service, self.stack_suffix.trim_matches('.')),
        };
        Url::parse(&raw)
            .map_err(|e| JanitorError::Configuration(format!("invalid {} url {}: {}", service, raw, e)))
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SUFFIX)
    }
}

fn config_error(e: config::ConfigError) -> JanitorError {
    JanitorError::Configuration(e.to_string())
}
