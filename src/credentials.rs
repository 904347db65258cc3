use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::core::error::{JanitorError, Result};
use crate::utils::token_fingerprint;

pub const TOKEN_ENV_PREFIX: &str = "KBC_STORAGE_TOKEN_";

/// Supplies the storage token used to open a project session.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token_for(&self, project_id: &str) -> Result<String>;

    fn source_name(&self) -> &str;
}

/// One token for every project, e.g. from `--token`.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token_for(&self, project_id: &str) -> Result<String> {
        non_empty(project_id, self.token.clone())
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

/// Reads `KBC_STORAGE_TOKEN_<project id>`.
pub struct EnvTokenSource;

#[async_trait]
impl TokenSource for EnvTokenSource {
    async fn token_for(&self, project_id: &str) -> Result<String> {
        let name = format!("{}{}", TOKEN_ENV_PREFIX, project_id);
        let token = std::env::var(&name).map_err(|_| {
            JanitorError::Authentication(format!("{} is not set", name))
        })?;
        non_empty(project_id, token)
    }

    fn source_name(&self) -> &str {
        "environment"
    }
}

/// Two-column CSV `projectId,token`, no header.
pub struct FileTokenSource {
    tokens: HashMap<String, String>,
}

impl FileTokenSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut tokens = HashMap::new();
        for (index, record) in csv.records().enumerate() {
            let record = record?;
            if record.len() != 2 {
                return Err(JanitorError::Validation(format!(
                    "token file row {} must contain exactly two columns",
                    index + 1
                )));
            }
            tokens.insert(record[0].to_string(), record[1].to_string());
        }

        debug!("Loaded tokens for {} projects", tokens.len());
        Ok(Self { tokens })
    }
}

#[async_trait]
impl TokenSource for FileTokenSource {
    async fn token_for(&self, project_id: &str) -> Result<String> {
        let token = self.tokens.get(project_id).cloned().ok_or_else(|| {
            JanitorError::Authentication(format!("no token for project {} in token file", project_id))
        })?;
        non_empty(project_id, token)
    }

    fn source_name(&self) -> &str {
        "file"
    }
}

/// Asks the operator on stderr and reads one line from stdin. Answers are
/// cached so a project is asked for at most once per run.
pub struct PromptTokenSource {
    cache: Mutex<HashMap<String, String>>,
}

impl PromptTokenSource {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for PromptTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for PromptTokenSource {
    async fn token_for(&self, project_id: &str) -> Result<String> {
        if let Some(token) = self.cache.lock().get(project_id) {
            return Ok(token.clone());
        }

        let prompt = format!("Paste storage token for project \"{}\" to continue.", project_id);
        let token = non_empty(project_id, prompt_line(prompt).await?)?;
        info!("Received token {} for project {}", token_fingerprint(&token), project_id);
        self.cache.lock().insert(project_id.to_string(), token.clone());
        Ok(token)
    }

    fn source_name(&self) -> &str {
        "prompt"
    }
}

/// Tries each source in order; the first one that has a token wins.
pub struct TokenSourceChain {
    sources: Vec<Arc<dyn TokenSource>>,
}

impl TokenSourceChain {
    pub fn new(sources: Vec<Arc<dyn TokenSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenSource for TokenSourceChain {
    async fn token_for(&self, project_id: &str) -> Result<String> {
        let mut last_error = None;
        for source in &self.sources {
            match source.token_for(project_id).await {
                Ok(token) => {
                    debug!("Token for project {} taken from {}", project_id, source.source_name());
                    return Ok(token);
                }
                Err(e @ JanitorError::Authentication(_)) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            JanitorError::Authentication(format!("no token source for project {}", project_id))
        }))
    }

    fn source_name(&self) -> &str {
        "chain"
    }
}

/// Writes `prompt` to stderr and reads one trimmed line from stdin.
pub async fn prompt_line(prompt: String) -> Result<String> {
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut stderr = std::io::stderr();
        writeln!(stderr, "{}", prompt)?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .map_err(|e| JanitorError::Authentication(format!("token prompt failed: {}", e)))??;
    Ok(line.trim().to_string())
}

fn non_empty(project_id: &str, token: String) -> Result<String> {
    if token.trim().is_empty() {
        Err(JanitorError::Authentication(format!("empty token for project {}", project_id)))
    } else {
        Ok(token)
    }
}
