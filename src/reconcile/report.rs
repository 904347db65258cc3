use std::fmt::Write;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::core::error::Result;

use super::models::{OutcomeCounts, ReconciliationOutcome, RunReport, TargetReport};

pub const MANUAL_DELETION_MARKER: &str = "needs manual deletion";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn render(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Reconciliation run {}{} ({} .. {})",
        report.run_id,
        if report.dry_run { " [dry-run]" } else { "" },
        report.started_at.to_rfc3339(),
        report.finished_at.to_rfc3339()
    );

    for project in &report.projects {
        let _ = writeln!(out, "\nProject {}", project.project_id);
        for target in &project.targets {
            let _ = writeln!(out, "  {}", target_line(target));
        }
        for warning in &project.warnings {
            let _ = writeln!(out, "  ~ {}", warning);
        }
        if let Some(error) = &project.error {
            let _ = writeln!(out, "  ! {}", error);
        }
        let _ = writeln!(out, "  {}", counts_line(&project.counts()));
    }

    let _ = writeln!(
        out,
        "\nTotal across {} projects: {}",
        report.projects.len(),
        counts_line(&report.counts())
    );
    out
}

fn target_line(report: &TargetReport) -> String {
    let schema = &report.target.schema;
    let resource = report
        .record
        .as_ref()
        .map(|r| format!(" [{}]", r.describe()))
        .unwrap_or_default();

    match &report.outcome {
        ReconciliationOutcome::Deleted {
            mechanism,
            already_gone: true,
        } => format!("{} deleted via {} (already gone){}", schema, mechanism, resource),
        ReconciliationOutcome::Deleted { mechanism, .. } => {
            format!("{} deleted via {}{}", schema, mechanism, resource)
        }
        ReconciliationOutcome::WouldDelete { mechanism } => {
            format!("{} would be deleted via {}{}", schema, mechanism, resource)
        }
        ReconciliationOutcome::Unresolved => {
            format!("{} unresolved, {}", schema, MANUAL_DELETION_MARKER)
        }
        ReconciliationOutcome::Failed { reason } => {
            format!("{} failed: {}{}", schema, reason, resource)
        }
    }
}

fn counts_line(counts: &OutcomeCounts) -> String {
    format!(
        "{} deleted, {} would delete, {} unresolved, {} failed ({} targets)",
        counts.deleted,
        counts.would_delete,
        counts.unresolved,
        counts.failed,
        counts.total()
    )
}
