use std::collections::HashMap;

use tracing::{debug, warn};

use super::models::{DeletionTarget, LiveResourceRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub target: DeletionTarget,
    pub record: LiveResourceRecord,
}

/// Result of matching one project's pending targets against its inventory.
/// `matches` and `unresolved` keep the order of the pending targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPlan {
    pub matches: Vec<Match>,
    pub unresolved: Vec<DeletionTarget>,
    /// Records hidden by an earlier record with the same schema.
    pub shadowed: Vec<LiveResourceRecord>,
}

impl MatchPlan {
    pub fn len(&self) -> usize {
        self.matches.len() + self.unresolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Matches by exact, case-sensitive schema equality. When two records share a
/// schema the first one in inventory order wins and the clash is logged.
pub fn match_targets(targets: &[DeletionTarget], inventory: &[LiveResourceRecord]) -> MatchPlan {
    let mut plan = MatchPlan::default();
    let mut first_by_schema: HashMap<&str, &LiveResourceRecord> = HashMap::new();
    for record in inventory {
        match first_by_schema.get(record.schema.as_str()) {
            Some(first) => {
                warn!(
                    "Schema {} is held by both {} and {}; using the former",
                    record.schema,
                    first.describe(),
                    record.describe()
                );
                plan.shadowed.push(record.clone());
            }
            None => {
                first_by_schema.insert(record.schema.as_str(), record);
            }
        }
    }

    for target in targets {
        match first_by_schema.remove(target.schema.as_str()) {
            Some(record) => {
                debug!("Target {} matched {}", target.schema, record.describe());
                plan.matches.push(Match {
                    target: target.clone(),
                    record: record.clone(),
                });
            }
            None => {
                debug!("Target {} has no live record", target.schema);
                plan.unresolved.push(target.clone());
            }
        }
    }
    plan
}
