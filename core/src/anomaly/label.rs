use super::pattern::PatternKind;
use crate::types::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};

/// Ground truth for one injected transaction.
///
/// Labels live only in the side channel. The observed transaction record
/// never carries them, apart from the optional description markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyLabel {
    pub label_id: String,
    pub run_id: String,
    pub transaction_id: String,
    pub entity_id: EntityId,
    /// Applied patterns in declared order.
    pub patterns: Vec<PatternKind>,
    /// Final magnitude over the entity's large-amount threshold.
    pub intensity: f64,
    pub injected_at: Timestamp,
    pub cluster_start: Timestamp,
    pub cluster_end: Timestamp,
}

impl AnomalyLabel {
    pub fn pattern_codes(&self) -> String {
        self.patterns
            .iter()
            .map(|p| p.code())
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Remove every pattern marker from a description, for scoring harnesses
/// that must not hand markers to the detector under test.
pub fn strip_markers(description: &str) -> String {
    let mut out = description.to_string();
    for p in PatternKind::ALL {
        out = out.replace(p.marker(), "");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
