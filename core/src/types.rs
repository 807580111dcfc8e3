//! Shared primitive types used across the whole generator.

use chrono::{NaiveDate, NaiveDateTime};

/// A stable customer identifier, e.g. `CUST_00042`.
pub type EntityId = String;

/// Position of an entity in the registry. Seeds and id ranges derive from it.
pub type EntityIndex = u32;

/// Every timestamp in the generator. UTC, microsecond precision.
pub type Timestamp = NaiveDateTime;

/// The canonical run identifier.
pub type RunId = String;

/// Wire format for timestamps in every artifact.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_ts(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
