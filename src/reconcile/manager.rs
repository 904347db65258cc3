use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::session::{PlatformApis, ProjectSession};
use crate::core::config::JanitorConfig;
use crate::core::error::{JanitorError, Result};
use crate::credentials::TokenSource;

use super::inventory::collect_inventory;
use super::matcher::match_targets;
use super::models::{
    DeletionTarget, ProjectReport, ReconciliationOutcome, RunReport, TargetReport, TargetSet,
};
use super::poller::{JobPoller, PollClock, TokioClock};
use super::sequencer::{DeletionSequencer, Submission};

pub struct ReconciliationManager {
    apis: PlatformApis,
    config: JanitorConfig,
    tokens: Arc<dyn TokenSource>,
    clock: Arc<dyn PollClock>,
}

impl ReconciliationManager {
    pub fn new(apis: PlatformApis, config: JanitorConfig, tokens: Arc<dyn TokenSource>) -> Self {
        info!("Initializing ReconciliationManager for stack {}", config.stack_suffix);
        Self {
            apis,
            config,
            tokens,
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn PollClock>) -> Self {
        self.clock = clock;
        self
    }

    /// One pass over every project in `targets`. Every token is verified
    /// before the first inventory call, so a credential problem aborts the run
    /// with nothing mutated. Later failures stay local to their target or
    /// project.
    pub async fn run(&self, targets: &TargetSet, force: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Starting reconciliation run {} ({} targets in {} projects, force: {})",
            run_id,
            targets.len(),
            targets.project_count(),
            force
        );

        let mut sessions = Vec::with_capacity(targets.project_count());
        for (project_id, _) in targets.projects() {
            sessions.push(self.open_session(project_id).await?);
        }

        let mut projects = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let project_id = session.project_id.as_str();
            let report = self
                .reconcile_project(session, targets.targets_for(project_id), force)
                .await;
            let counts = report.counts();
            info!(
                "Project {} done: {} deleted, {} would delete, {} unresolved, {} failed",
                project_id, counts.deleted, counts.would_delete, counts.unresolved, counts.failed
            );
            projects.push(report);
        }

        Ok(RunReport {
            run_id,
            dry_run: !force,
            started_at,
            finished_at: Utc::now(),
            projects,
        })
    }

    async fn open_session(&self, project_id: &str) -> Result<ProjectSession> {
        let token = self.tokens.token_for(project_id).await?;
        let session = ProjectSession::new(project_id, token, self.config.endpoints()?);

        let info = self.apis.storage.verify_token(&session).await.map_err(|e| {
            JanitorError::Authentication(format!(
                "token {} for project {} failed verification: {}",
                session.fingerprint(),
                project_id,
                e
            ))
        })?;
        if info.owner.id != project_id {
            return Err(JanitorError::Authentication(format!(
                "token {} belongs to project {}, not {}",
                session.fingerprint(),
                info.owner.id,
                project_id
            )));
        }

        info!("Opened session for project {} with token {}", project_id, session.fingerprint());
        Ok(session)
    }

    async fn reconcile_project(
        &self,
        session: &ProjectSession,
        targets: Vec<DeletionTarget>,
        force: bool,
    ) -> ProjectReport {
        let mut report = ProjectReport::new(session.project_id.clone());

        let inventory = match collect_inventory(&self.apis, session).await {
            Ok(inventory) => inventory,
            Err(e) => {
                let err = JanitorError::inventory(session.project_id.clone(), e);
                error!("{}", err);
                report.error = Some(err.to_string());
                report.targets = targets.into_iter().map(unresolved).collect();
                return report;
            }
        };

        let plan = match_targets(&targets, &inventory);
        if !plan.shadowed.is_empty() {
            report.warnings.extend(plan.shadowed.iter().map(|record| {
                format!("schema {} also held by {}, left untouched", record.schema, record.describe())
            }));
        }
        info!(
            "Project {}: {} of {} targets matched live resources",
            session.project_id,
            plan.matches.len(),
            targets.len()
        );

        let mut reports: Vec<TargetReport> = plan.unresolved.into_iter().map(unresolved).collect();
        let sequencer = DeletionSequencer::new(&self.apis, &self.config, force);
        let mut jobs = Vec::new();
        for matched in plan.matches {
            match sequencer.submit(session, matched).await {
                Submission::Settled(settled) => reports.push(settled),
                Submission::Pending(job) => jobs.push(job),
            }
        }

        if !jobs.is_empty() {
            let poller = JobPoller::new(
                &self.apis,
                self.clock.clone(),
                self.config.poll_interval(),
                self.config.poll_timeout(),
            );
            let outcome = poller.wait_all(session, &sequencer, jobs).await;
            reports.extend(outcome.reports);
            if let Some(timeout) = outcome.timeout {
                warn!("{}", timeout);
                report.error = Some(timeout.to_string());
                report.timed_out = true;
            }
        }

        reports.sort_by_key(|r| targets.iter().position(|t| t == &r.target));
        report.targets = reports;
        report
    }
}

fn unresolved(target: DeletionTarget) -> TargetReport {
    warn!(
        "Workspace {} in project {} not found, needs manual deletion",
        target.schema, target.project_id
    );
    TargetReport {
        target,
        record: None,
        outcome: ReconciliationOutcome::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakePlatform, container_sandbox, db_sandbox, workspace};
    use crate::api::models::JobStatus;
    use crate::credentials::{FileTokenSource, StaticTokenSource};
    use crate::reconcile::models::DeletionMechanism;
    use crate::reconcile::poller::ManualClock;
    use std::collections::HashSet;

    fn manager(apis: PlatformApis, config: JanitorConfig) -> ReconciliationManager {
        ReconciliationManager::new(apis, config, Arc::new(StaticTokenSource::new("secret")))
            .with_clock(Arc::new(ManualClock::new()))
    }

    fn target_set(rows: &[(&str, &str)]) -> TargetSet {
        let mut set = TargetSet::new();
        for (project, schema) in rows {
            set.insert(project, schema);
        }
        set
    }

    fn scenario_platform() -> FakePlatform {
        FakePlatform::new()
            .with_branch("10", true)
            .with_sandbox(None, db_sandbox("s1", "WORKSPACE_1", "w1"))
            .with_workspace("10", workspace("w1", "WORKSPACE_1"))
    }

    #[tokio::test]
    async fn test_scenario_a_force_deletes_matched_sandbox() {
        let (platform, apis) = scenario_platform().into_apis();
        let targets = target_set(&[("100", "WORKSPACE_1"), ("100", "WORKSPACE_2")]);

        let report = manager(apis, JanitorConfig::default()).run(&targets, true).await.unwrap();
        let project = report.project("100").unwrap();

        assert!(matches!(
            project.outcome_of("WORKSPACE_1"),
            Some(ReconciliationOutcome::Deleted {
                mechanism: DeletionMechanism::Job { job_id: Some(_) },
                ..
            })
        ));
        assert_eq!(project.outcome_of("WORKSPACE_2"), Some(&ReconciliationOutcome::Unresolved));

        let jobs = platform
            .mutations()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateJob { .. }))
            .count();
        assert_eq!(jobs, 1);
        assert!(!report.dry_run);
    }

    #[tokio::test]
    async fn test_scenario_b_dry_run_is_read_only() {
        let (platform, apis) = scenario_platform().into_apis();
        let targets = target_set(&[("100", "WORKSPACE_1"), ("100", "WORKSPACE_2")]);

        let report = manager(apis, JanitorConfig::default()).run(&targets, false).await.unwrap();
        let project = report.project("100").unwrap();

        assert_eq!(
            project.outcome_of("WORKSPACE_1"),
            Some(&ReconciliationOutcome::WouldDelete {
                mechanism: DeletionMechanism::Job { job_id: None },
            })
        );
        assert_eq!(project.outcome_of("WORKSPACE_2"), Some(&ReconciliationOutcome::Unresolved));
        assert!(platform.mutations().is_empty());
        assert!(report.dry_run);
    }

    #[tokio::test]
    async fn test_scenario_c_storage_only_direct_call() {
        let (platform, apis) = FakePlatform::new()
            .with_branch("10", true)
            .with_workspace("10", workspace("w3", "WORKSPACE_3"))
            .into_apis();
        let targets = target_set(&[("100", "WORKSPACE_3")]);

        let report = manager(apis, JanitorConfig::default()).run(&targets, true).await.unwrap();

        assert_eq!(
            report.project("100").unwrap().outcome_of("WORKSPACE_3"),
            Some(&ReconciliationOutcome::Deleted {
                mechanism: DeletionMechanism::DirectCall,
                already_gone: false,
            })
        );
        assert_eq!(
            platform.mutations(),
            vec![Call::DeleteWorkspace {
                branch_id: "10".into(),
                workspace_id: "w3".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_every_target_gets_exactly_one_outcome() {
        let (_platform, apis) = FakePlatform::new()
            .with_branch("10", true)
            .with_branch("11", false)
            .with_sandbox(None, db_sandbox("s1", "WORKSPACE_1", "w1"))
            .with_workspace("10", workspace("w1", "WORKSPACE_1"))
            .with_workspace("10", workspace("w2", "WORKSPACE_2"))
            .with_sandbox(Some("11"), container_sandbox("s4", Some("WORKSPACE_4"), Some("w4")))
            .with_workspace("11", workspace("w5", "WORKSPACE_5"))
            .with_failing_workspace("w5")
            .with_job_script(&[JobStatus::Processing, JobStatus::Success])
            .with_job_script(&[JobStatus::Cancelled])
            .into_apis();
        let rows = [
            ("100", "WORKSPACE_1"),
            ("100", "WORKSPACE_2"),
            ("100", "WORKSPACE_3"),
            ("100", "WORKSPACE_4"),
            ("100", "WORKSPACE_5"),
            ("200", "WORKSPACE_2"),
        ];
        let targets = target_set(&rows);

        let report = manager(apis, JanitorConfig::default()).run(&targets, true).await.unwrap();

        let seen: Vec<_> = report
            .projects
            .iter()
            .flat_map(|p| p.targets.iter().map(|t| t.target.clone()))
            .collect();
        let expected: Vec<_> = rows.iter().map(|(p, s)| DeletionTarget::new(*p, *s)).collect();
        assert_eq!(seen, expected);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), rows.len());

        let counts = report.counts();
        assert_eq!(counts.total(), rows.len());
        assert_eq!(counts.failed, 2);

        let project = report.project("100").unwrap();
        assert_eq!(project.outcome_of("WORKSPACE_3"), Some(&ReconciliationOutcome::Unresolved));
        assert_eq!(project.outcome_of("WORKSPACE_4").map(|o| o.label()), Some("failed"));
        assert_eq!(project.outcome_of("WORKSPACE_5").map(|o| o.label()), Some("failed"));
    }

    #[tokio::test]
    async fn test_prefix_schema_does_not_match() {
        let (platform, apis) = FakePlatform::new()
            .with_branch("10", true)
            .with_workspace("10", workspace("w1", "WORKSPACE_1234"))
            .into_apis();
        let targets = target_set(&[("100", "WORKSPACE_123")]);

        let report = manager(apis, JanitorConfig::default()).run(&targets, true).await.unwrap();
        assert_eq!(
            report.project("100").unwrap().outcome_of("WORKSPACE_123"),
            Some(&ReconciliationOutcome::Unresolved)
        );
        assert!(platform.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_schema_is_reported_as_warning() {
        let (platform, apis) = FakePlatform::new()
            .with_branch("10", true)
            .with_branch("11", false)
            .with_workspace("10", workspace("w-main", "WORKSPACE_1"))
            .with_workspace("11", workspace("w-dev", "WORKSPACE_1"))
            .into_apis();
        let targets = target_set(&[("100", "WORKSPACE_1")]);

        let report = manager(apis, JanitorConfig::default()).run(&targets, true).await.unwrap();
        let project = report.project("100").unwrap();

        assert_eq!(
            project.warnings,
            vec!["schema WORKSPACE_1 also held by workspace w-dev (branch 11), left untouched".to_string()]
        );
        assert_eq!(
            platform.mutations(),
            vec![Call::DeleteWorkspace {
                branch_id: "10".into(),
                workspace_id: "w-main".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_inventory_failure_is_local_to_project() {
        let (_platform, apis) = FakePlatform::new()
            .with_branch("10", true)
            .with_branch("11", false)
            .with_failing_sandbox_listing("11")
            .into_apis();
        let targets = target_set(&[("100", "WORKSPACE_1"), ("200", "WORKSPACE_2")]);

        let report = manager(apis, JanitorConfig::default()).run(&targets, true).await.unwrap();

        for project in &report.projects {
            assert!(project.error.as_deref().unwrap().contains("503"));
            assert_eq!(project.counts().unresolved, 1);
        }
        assert_eq!(report.projects.len(), 2);
    }

    #[tokio::test]
    async fn test_token_for_other_project_aborts_run() {
        let (platform, apis) = scenario_platform().with_token_owner("999").into_apis();
        let targets = target_set(&[("100", "WORKSPACE_1")]);

        let err = manager(apis, JanitorConfig::default())
            .run(&targets, true)
            .await
            .unwrap_err();
        assert!(matches!(err, JanitorError::Authentication(_)));
        assert!(!err.to_string().contains("secret"));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_aborts_before_any_project_is_touched() {
        let (platform, apis) = FakePlatform::new()
            .with_branch("10", true)
            .with_workspace("10", workspace("w3", "WORKSPACE_3"))
            .into_apis();
        let tokens = FileTokenSource::from_reader("100,100-secret\n".as_bytes()).unwrap();
        let manager = ReconciliationManager::new(apis, JanitorConfig::default(), Arc::new(tokens))
            .with_clock(Arc::new(ManualClock::new()));
        let targets = target_set(&[("100", "WORKSPACE_3"), ("200", "WORKSPACE_9")]);

        let err = manager.run(&targets, true).await.unwrap_err();

        assert!(matches!(err, JanitorError::Authentication(_)));
        assert!(err.to_string().contains("200"));
        assert!(platform.calls().is_empty(), "calls: {:?}", platform.calls());
    }

    #[tokio::test]
    async fn test_poll_timeout_marks_project() {
        let (platform, apis) = scenario_platform()
            .with_job_script(&[JobStatus::Processing])
            .into_apis();
        let mut config = JanitorConfig::default();
        config.poll_timeout_secs = Some(4);
        let targets = target_set(&[("100", "WORKSPACE_1")]);

        let report = manager(apis, config).run(&targets, true).await.unwrap();
        let project = report.project("100").unwrap();

        assert!(report.has_timeouts());
        assert!(project.error.as_deref().unwrap().contains("still running after 4s"));
        assert_eq!(project.outcome_of("WORKSPACE_1").map(|o| o.label()), Some("failed"));
        assert!(
            !platform
                .calls()
                .iter()
                .any(|c| matches!(c, Call::DeleteWorkspace { .. }))
        );
    }
}
