use std::io::Read;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::core::error::{JanitorError, Result};

use super::models::TargetSet;

lazy_static! {
    static ref PROJECT_ID: Regex = Regex::new(r"^[0-9]+$").expect("valid project id pattern");
}

pub fn load_targets(path: &Path, schema_prefix: &str) -> Result<TargetSet> {
    info!("Fetching deletion targets from {}", path.display());
    let file = std::fs::File::open(path).map_err(|e| {
        JanitorError::Validation(format!("cannot open {}: {}", path.display(), e))
    })?;
    parse_targets(file, schema_prefix)
}

/// Parses headerless `projectId,workspaceSchema` rows. Any invalid row fails
/// the whole input; nothing is returned partially.
pub fn parse_targets<R: Read>(reader: R, schema_prefix: &str) -> Result<TargetSet> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut targets = TargetSet::new();
    for (index, record) in csv.records().enumerate() {
        let row = index + 1;
        let record = record.map_err(|e| JanitorError::Validation(format!("row {}: {}", row, e)))?;

        if record.len() != 2 {
            return Err(JanitorError::Validation(format!(
                "row {}: expected exactly two columns, found {}",
                row,
                record.len()
            )));
        }

        let project_id = &record[0];
        let schema = &record[1];
        if !PROJECT_ID.is_match(project_id) {
            return Err(JanitorError::Validation(format!(
                "row {}: project id \"{}\" is not numeric",
                row, project_id
            )));
        }
        if !schema.starts_with(schema_prefix) {
            return Err(JanitorError::Validation(format!(
                "row {}: workspace \"{}\" does not start with \"{}\"",
                row, schema, schema_prefix
            )));
        }

        if !targets.insert(project_id, schema) {
            debug!("Duplicate target {}/{} collapsed", project_id, schema);
        }
    }

    info!(
        "Loaded {} deletion targets across {} projects",
        targets.len(),
        targets.project_count()
    );
    Ok(targets)
}
