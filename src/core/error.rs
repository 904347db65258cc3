use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum JanitorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Inventory of project {project_id} failed: {source}")]
    Inventory {
        project_id: String,
        #[source]
        source: ApiError,
    },

    #[error(
        "Project {project_id}: {pending_jobs} deletion job(s) still running after {waited_secs}s"
    )]
    PollTimeout {
        project_id: String,
        waited_secs: u64,
        pending_jobs: usize,
    },

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JanitorError {
    pub fn inventory(project_id: impl Into<String>, source: ApiError) -> Self {
        Self::Inventory {
            project_id: project_id.into(),
            source,
        }
    }

    /// Structural failures stop the whole run; everything else stays local to
    /// a target or a project.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Validation(_)
                | Self::Authentication(_)
                | Self::Io(_)
                | Self::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JanitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(JanitorError::Validation("bad row".into()).is_structural());
        assert!(JanitorError::Authentication("bad token".into()).is_structural());
        assert!(!JanitorError::inventory("42", ApiError::NotFound("branches".into())).is_structural());
        assert!(
            !JanitorError::PollTimeout {
                project_id: "42".into(),
                waited_secs: 600,
                pending_jobs: 2,
            }
            .is_structural()
        );
    }

    #[test]
    fn test_poll_timeout_message() {
        let err = JanitorError::PollTimeout {
            project_id: "7".into(),
            waited_secs: 30,
            pending_jobs: 1,
        };
        assert_eq!(
            err.to_string(),
            "Project 7: 1 deletion job(s) still running after 30s"
        );
    }
}
