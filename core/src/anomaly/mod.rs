//! Anomaly selection and injection.
//!
//! A calibrated subset of entities is flagged, and each flagged entity gets
//! a clustered, escalating set of suspicious transactions with ground-truth
//! labels kept out of the observed record.

pub mod inject;
pub mod label;
pub mod pattern;
pub mod selection;

pub use inject::{AnomalyInjector, ClusterWindow};
pub use label::{strip_markers, AnomalyLabel};
pub use pattern::PatternKind;
pub use selection::{flagged_count, select_entities};
