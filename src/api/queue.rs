use async_trait::async_trait;
use tracing::{debug, info};

use super::base::{ApiResult, QueueApi};
use super::client::{RestClient, decode_list, endpoint};
use super::models::{Job, JobStatus, NewJob};
use super::session::ProjectSession;

pub struct QueueClient {
    rest: RestClient,
}

impl QueueClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl QueueApi for QueueClient {
    async fn create_job(&self, session: &ProjectSession, job: &NewJob) -> ApiResult<Job> {
        let url = endpoint(&session.endpoints.queue, "jobs")?;
        let created: Job = self.rest.post_json(session, url, job).await?;
        info!(
            "Created {} job {} in project {}",
            job.component, created.id, session.project_id
        );
        Ok(created)
    }

    async fn get_job(&self, session: &ProjectSession, job_id: &str) -> ApiResult<Job> {
        let url = endpoint(&session.endpoints.queue, &format!("jobs/{}", job_id))?;
        self.rest.get_json(session, url).await
    }

    async fn terminate_job(&self, session: &ProjectSession, job_id: &str) -> ApiResult<()> {
        let url = endpoint(&session.endpoints.queue, &format!("jobs/{}/kill", job_id))?;
        self.rest.post_empty(session, url).await
    }

    async fn list_jobs(
        &self,
        session: &ProjectSession,
        statuses: &[JobStatus],
        limit: usize,
    ) -> ApiResult<Vec<Job>> {
        let mut url = endpoint(&session.endpoints.queue, "search/jobs")?;
        {
            let mut query = url.query_pairs_mut();
            for status in statuses {
                query.append_pair("status[]", status.as_str());
            }
            query.append_pair("limit", &limit.to_string());
        }

        let items: Vec<serde_json::Value> = self.rest.get_json(session, url).await?;
        let jobs: Vec<Job> = decode_list(items, "job");
        debug!("Project {} has {} matching jobs", session.project_id, jobs.len());
        Ok(jobs)
    }
}
