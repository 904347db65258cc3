use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::core::error::{JanitorError, Result};
use crate::utils::safe_truncate_ellipsis;

use super::base::{ApiError, ApiResult};
use super::session::ProjectSession;

pub const TOKEN_HEADER: &str = "X-StorageApi-Token";

pub const MANAGE_TOKEN_HEADER: &str = "X-KBC-ManageApiToken";

const INITIAL_RETRY_DELAY_MS: u64 = 100;

const MAX_RETRY_DELAY_MS: u64 = 10000;

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Token-authenticated JSON transport shared by the storage, sandboxes, queue
/// and manage clients.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    max_retries: u32,
}

impl RestClient {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("workspace-janitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JanitorError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            max_retries: max_retries.max(1),
        })
    }

    pub async fn get_json<T>(&self, session: &ProjectSession, url: Url) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .send::<()>(TOKEN_HEADER, session.token(), Method::GET, url, None)
            .await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn post_json<T, B>(&self, session: &ProjectSession, url: Url, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        self.post_json_as(TOKEN_HEADER, session.token(), url, body).await
    }

    /// POST authenticated by an arbitrary token header instead of a project's
    /// storage token.
    pub async fn post_json_as<T, B>(&self, header: &str, token: &str, url: Url, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let response = self.send(header, token, Method::POST, url, Some(body)).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn post_empty(&self, session: &ProjectSession, url: Url) -> ApiResult<()> {
        self.send::<()>(TOKEN_HEADER, session.token(), Method::POST, url, None)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, session: &ProjectSession, url: Url) -> ApiResult<()> {
        self.send::<()>(TOKEN_HEADER, session.token(), Method::DELETE, url, None)
            .await?;
        Ok(())
    }

    // Only idempotent requests are retried; a POST that reached the server may
    // already have created a job.
    async fn send<B>(
        &self,
        header: &str,
        token: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> ApiResult<Response>
    where
        B: Serialize + Sync,
    {
        let attempts = if method == Method::GET || method == Method::DELETE {
            self.max_retries
        } else {
            1
        };
        let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("{} {} (attempt {})", method, url, attempt);

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(header, token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) => match check_status(response).await {
                    Ok(response) => return Ok(response),
                    Err(e) if e.is_retryable() => e,
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_connect() || e.is_timeout() => ApiError::Http(e),
                Err(e) => return Err(ApiError::Http(e)),
            };

            if attempt < attempts {
                debug!("{} {} failed (attempt {}), retrying: {}", method, url, attempt, error);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(MAX_RETRY_DELAY_MS));
            } else if attempts > 1 {
                warn!("{} {} failed (final attempt {}): {}", method, url, attempt, error);
            }
            last_error = Some(error);
        }

        match last_error {
            Some(error) if attempts == 1 => Err(error),
            Some(error) => Err(ApiError::RetryExhausted(attempts, error.to_string())),
            None => Err(ApiError::RetryExhausted(attempts, "Unknown error".to_string())),
        }
    }
}

async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let body = safe_truncate_ellipsis(body.trim(), MAX_ERROR_BODY_CHARS);

    if status.as_u16() == 404 {
        Err(ApiError::NotFound(url))
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Joins `path` onto a service base URL, keeping any path prefix the base has.
pub fn endpoint(base: &Url, path: &str) -> ApiResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Decodes list items one by one, dropping (and logging) malformed entries so
/// a single odd record does not hide the rest of the inventory.
pub fn decode_list<T>(items: Vec<serde_json::Value>, what: &str) -> Vec<T>
where
    T: DeserializeOwned,
{
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                let id = item.get("id").map(|v| v.to_string()).unwrap_or_default();
                warn!("Skipping malformed {} record {}: {}", what, id, e);
                None
            }
        })
        .collect()
}
