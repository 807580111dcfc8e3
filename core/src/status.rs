//! Status history projector (SCD Type 2).
//!
//! RULE: Intervals for one entity are ordered and contiguous, and exactly
//! one of them is open. The prior interval is closed in the same step that
//! opens the next one.

use crate::{
    error::{SynthError, SynthResult},
    ids::{IdBlock, IdKind},
    timeline::{EventKind, LifecycleEvent},
    types::{EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusValue {
    Active,
    Closed,
}

impl StatusValue {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInterval {
    pub status_id: String,
    pub entity_id: EntityId,
    pub status: StatusValue,
    pub reason: String,
    pub valid_from: Timestamp,
    pub valid_to: Option<Timestamp>,
    /// The event that opened this interval.
    pub event_id: String,
}

impl StatusInterval {
    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// The status an event moves the entity into, if it changes status at all.
fn status_after(kind: EventKind) -> Option<StatusValue> {
    match kind {
        EventKind::Onboarding | EventKind::Reactivation => Some(StatusValue::Active),
        EventKind::Closure | EventKind::Churn => Some(StatusValue::Closed),
        _ => None,
    }
}

fn reason_for(kind: EventKind) -> String {
    match kind {
        EventKind::Onboarding => "INITIAL_ONBOARDING".to_string(),
        other => format!("{}_EVENT", other.code()),
    }
}

/// Project an ordered timeline into its status history.
pub fn project(
    entity_id: &str,
    events: &[LifecycleEvent],
    ids: &mut IdBlock,
) -> SynthResult<Vec<StatusInterval>> {
    match events.first() {
        Some(e) if e.kind == EventKind::Onboarding => {}
        _ => return Err(SynthError::constraint(entity_id, "timeline does not start with ONBOARDING")),
    }

    let mut intervals: Vec<StatusInterval> = Vec::new();
    for event in events {
        let Some(status) = status_after(event.kind) else {
            continue;
        };
        if let Some(open) = intervals.last_mut() {
            if open.status == StatusValue::Closed && status == StatusValue::Closed {
                return Err(SynthError::constraint(
                    entity_id,
                    format!("{} on an already closed relationship", event.event_id),
                ));
            }
            if event.timestamp <= open.valid_from {
                return Err(SynthError::constraint(
                    entity_id,
                    format!("{} does not follow interval {}", event.event_id, open.status_id),
                ));
            }
            open.valid_to = Some(event.timestamp);
        }
        intervals.push(StatusInterval {
            status_id: ids.next(IdKind::Status),
            entity_id: entity_id.to_string(),
            status,
            reason: reason_for(event.kind),
            valid_from: event.timestamp,
            valid_to: None,
            event_id: event.event_id.clone(),
        });
    }

    validate_contiguity(entity_id, &intervals)?;
    Ok(intervals)
}

/// No gaps, no overlaps, exactly one open interval and it is the last.
pub fn validate_contiguity(entity_id: &str, intervals: &[StatusInterval]) -> SynthResult<()> {
    if intervals.is_empty() {
        return Err(SynthError::constraint(entity_id, "no status intervals"));
    }
    for pair in intervals.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.valid_to != Some(b.valid_from) {
            return Err(SynthError::constraint(
                entity_id,
                format!("gap or overlap between {} and {}", a.status_id, b.status_id),
            ));
        }
        if b.valid_from <= a.valid_from {
            return Err(SynthError::constraint(
                entity_id,
                format!("interval {} is empty or reversed", a.status_id),
            ));
        }
    }
    let open = intervals.iter().filter(|i| i.is_current()).count();
    if open != 1 {
        return Err(SynthError::constraint(entity_id, format!("{open} open status intervals")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Provenance;
    use chrono::{Duration, NaiveDate};

    fn event(kind: EventKind, day: i64, id: &str) -> LifecycleEvent {
        let at = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
            + Duration::days(day);
        let mut e = LifecycleEvent::new("CUST_00001", kind, at, Provenance::Random);
        e.event_id = id.to_string();
        e
    }

    #[test]
    fn non_status_events_do_not_open_intervals() {
        let events = vec![
            event(EventKind::Onboarding, 0, "E1"),
            event(EventKind::TierUpgrade, 40, "E2"),
            event(EventKind::AddressChange, 90, "E3"),
        ];
        let intervals = project("CUST_00001", &events, &mut IdBlock::for_entity(0)).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].reason, "INITIAL_ONBOARDING");
        assert!(intervals[0].is_current());
    }

    #[test]
    fn closure_then_reactivation_chains_intervals() {
        let events = vec![
            event(EventKind::Onboarding, 0, "E1"),
            event(EventKind::Closure, 50, "E2"),
            event(EventKind::Reactivation, 120, "E3"),
        ];
        let intervals = project("CUST_00001", &events, &mut IdBlock::for_entity(0)).unwrap();
        let statuses: Vec<_> = intervals.iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![StatusValue::Active, StatusValue::Closed, StatusValue::Active]);
        assert_eq!(intervals[1].reason, "CLOSURE_EVENT");
        assert_eq!(intervals[1].event_id, "E2");
        assert_eq!(intervals[0].valid_to, Some(intervals[1].valid_from));
    }

    #[test]
    fn two_open_intervals_are_a_violation() {
        let events = vec![event(EventKind::Onboarding, 0, "E1")];
        let mut intervals = project("CUST_00001", &events, &mut IdBlock::for_entity(0)).unwrap();
        let mut second = intervals[0].clone();
        second.valid_from += Duration::days(1);
        intervals.push(second);
        assert!(validate_contiguity("CUST_00001", &intervals).is_err());
    }

    #[test]
    fn double_closure_is_rejected() {
        let events = vec![
            event(EventKind::Onboarding, 0, "E1"),
            event(EventKind::Churn, 10, "E2"),
            event(EventKind::Closure, 20, "E3"),
        ];
        assert!(project("CUST_00001", &events, &mut IdBlock::for_entity(0)).is_err());
    }
}
