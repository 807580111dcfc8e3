//! Per-entity lifecycle state machine.
//!
//! RULE: This table is the only authority on which event may follow which.
//! The scheduler consults it before every insertion and the engine replays
//! every finished timeline through it.

use super::event::{EventKind, LifecycleEvent, Provenance};
use crate::{
    error::{SynthError, SynthResult},
    types::Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Prospect,
    Active,
    /// Active, but inside a window with no transaction activity.
    Dormant,
    Closed,
}

use EventKind as K;
use LifecycleState as S;

/// (from, event, to). Anything not listed is illegal.
pub const TRANSITIONS: &[(LifecycleState, EventKind, LifecycleState)] = &[
    (S::Prospect, K::Onboarding, S::Active),
    (S::Active, K::AddressChange, S::Active),
    (S::Active, K::EmploymentChange, S::Active),
    (S::Active, K::TierUpgrade, S::Active),
    (S::Active, K::Closure, S::Closed),
    (S::Active, K::Churn, S::Closed),
    (S::Dormant, K::AddressChange, S::Dormant),
    (S::Dormant, K::Reactivation, S::Active),
    (S::Closed, K::Reactivation, S::Active),
];

pub fn next_state(from: LifecycleState, kind: EventKind) -> Option<LifecycleState> {
    TRANSITIONS
        .iter()
        .find(|(f, k, _)| *f == from && *k == kind)
        .map(|(_, _, to)| *to)
}

/// Half-open span [start, end) with no transaction activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DormancyWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DormancyWindow {
    pub fn contains(&self, ts: &Timestamp) -> bool {
        *ts >= self.start && *ts < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Illegal { from: LifecycleState, kind: EventKind },
    /// Closure or churn for a customer that may never close.
    NotClosable,
    OutOfOrder { previous: Timestamp, at: Timestamp },
    /// A RANDOM event other than REACTIVATION inside a dormancy window.
    DormantWindow { kind: EventKind, at: Timestamp },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Illegal { from, kind } => write!(f, "{} is illegal from {from:?}", kind.code()),
            Self::NotClosable => write!(f, "customer is not closure eligible"),
            Self::OutOfOrder { previous, at } => write!(f, "{at} does not follow {previous}"),
            Self::DormantWindow { kind, at } => {
                write!(f, "RANDOM {} at {at} falls in a dormancy window", kind.code())
            }
        }
    }
}

pub struct EntityStateMachine<'a> {
    closure_eligible: bool,
    dormancy: &'a [DormancyWindow],
    /// Prospect, Active or Closed. Dormancy is overlaid from the windows.
    base: LifecycleState,
    last: Option<Timestamp>,
    /// A reactivation ends dormancy for the rest of the window it falls in.
    reactivated_at: Option<Timestamp>,
}

impl<'a> EntityStateMachine<'a> {
    pub fn new(closure_eligible: bool, dormancy: &'a [DormancyWindow]) -> Self {
        Self {
            closure_eligible,
            dormancy,
            base: LifecycleState::Prospect,
            last: None,
            reactivated_at: None,
        }
    }

    /// The state an event at `at` would see.
    pub fn state_at(&self, at: &Timestamp) -> LifecycleState {
        let dormant = self.dormancy.iter().any(|w| {
            w.contains(at) && !matches!(self.reactivated_at, Some(r) if r >= w.start && r < *at)
        });
        if self.base == LifecycleState::Active && dormant {
            LifecycleState::Dormant
        } else {
            self.base
        }
    }

    fn in_window(&self, at: &Timestamp) -> bool {
        self.dormancy.iter().any(|w| w.contains(at))
    }

    pub fn apply(&mut self, kind: EventKind, at: Timestamp) -> Result<LifecycleState, Rejection> {
        if let Some(previous) = self.last {
            if at <= previous {
                return Err(Rejection::OutOfOrder { previous, at });
            }
        }
        let from = self.state_at(&at);
        let to = next_state(from, kind).ok_or(Rejection::Illegal { from, kind })?;
        if kind.ends_relationship() && !self.closure_eligible {
            return Err(Rejection::NotClosable);
        }
        self.base = match to {
            LifecycleState::Dormant => LifecycleState::Active,
            other => other,
        };
        if kind == EventKind::Reactivation {
            self.reactivated_at = Some(at);
        }
        self.last = Some(at);
        Ok(to)
    }

    /// `apply` plus the provenance rule: inside a dormancy window the only
    /// RANDOM event allowed is REACTIVATION, even once dormancy has ended.
    pub fn apply_event(&mut self, event: &LifecycleEvent) -> Result<LifecycleState, Rejection> {
        if event.provenance == Provenance::Random
            && event.kind != EventKind::Reactivation
            && self.in_window(&event.timestamp)
        {
            return Err(Rejection::DormantWindow { kind: event.kind, at: event.timestamp });
        }
        self.apply(event.kind, event.timestamp)
    }
}

/// Replay a full timeline. Returns the state each event was applied in.
pub fn replay(
    entity_id: &str,
    events: &[LifecycleEvent],
    closure_eligible: bool,
    dormancy: &[DormancyWindow],
) -> SynthResult<Vec<LifecycleState>> {
    let mut fsm = EntityStateMachine::new(closure_eligible, dormancy);
    let mut seen = Vec::with_capacity(events.len());
    for event in events {
        seen.push(fsm.state_at(&event.timestamp));
        fsm.apply_event(event).map_err(|r| {
            SynthError::constraint(entity_id, format!("event {} rejected: {r}", event.event_id))
        })?;
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t(day: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
            + Duration::days(day)
    }

    #[test]
    fn only_reactivation_follows_closure() {
        for kind in [K::AddressChange, K::EmploymentChange, K::TierUpgrade, K::Closure, K::Churn] {
            assert_eq!(next_state(S::Closed, kind), None, "{kind:?} allowed after closure");
        }
        assert_eq!(next_state(S::Closed, K::Reactivation), Some(S::Active));
    }

    #[test]
    fn dormant_window_blocks_everything_but_reactivation_and_data() {
        let windows = [DormancyWindow { start: t(10), end: t(20) }];
        let mut fsm = EntityStateMachine::new(true, &windows);
        fsm.apply(K::Onboarding, t(0)).unwrap();
        assert_eq!(fsm.state_at(&t(15)), S::Dormant);
        assert!(matches!(
            fsm.apply(K::EmploymentChange, t(12)),
            Err(Rejection::Illegal { from: S::Dormant, .. })
        ));
        assert!(matches!(fsm.apply(K::Closure, t(12)), Err(Rejection::Illegal { .. })));
        assert_eq!(fsm.apply(K::AddressChange, t(13)), Ok(S::Dormant));
        assert_eq!(fsm.apply(K::Reactivation, t(14)), Ok(S::Active));
        assert_eq!(fsm.apply(K::TierUpgrade, t(21)), Ok(S::Active));
    }

    #[test]
    fn reactivation_ends_dormancy_for_the_rest_of_the_window() {
        let windows = [DormancyWindow { start: t(10), end: t(40) }];
        let mut fsm = EntityStateMachine::new(true, &windows);
        fsm.apply(K::Onboarding, t(0)).unwrap();
        assert_eq!(fsm.apply(K::Reactivation, t(15)), Ok(S::Active));
        assert_eq!(fsm.state_at(&t(20)), S::Active);
        assert!(matches!(
            fsm.apply(K::Reactivation, t(20)),
            Err(Rejection::Illegal { from: S::Active, .. })
        ));
    }

    #[test]
    fn random_events_stay_out_of_windows_after_reactivation() {
        let windows = [DormancyWindow { start: t(10), end: t(40) }];
        let mut fsm = EntityStateMachine::new(true, &windows);
        let event = |kind, day, provenance| LifecycleEvent::new("CUST_00001", kind, t(day), provenance);
        fsm.apply_event(&event(K::Onboarding, 0, Provenance::DataDriven)).unwrap();
        fsm.apply_event(&event(K::Reactivation, 12, Provenance::Random)).unwrap();
        assert!(matches!(
            fsm.apply_event(&event(K::TierUpgrade, 20, Provenance::Random)),
            Err(Rejection::DormantWindow { .. })
        ));
        assert_eq!(fsm.apply_event(&event(K::AddressChange, 21, Provenance::DataDriven)), Ok(S::Active));
        assert_eq!(fsm.apply_event(&event(K::TierUpgrade, 45, Provenance::Random)), Ok(S::Active));
    }

    #[test]
    fn reactivation_is_illegal_while_active() {
        let mut fsm = EntityStateMachine::new(true, &[]);
        fsm.apply(K::Onboarding, t(0)).unwrap();
        assert!(fsm.apply(K::Reactivation, t(1)).is_err());
    }

    #[test]
    fn ineligible_customer_cannot_close() {
        let mut fsm = EntityStateMachine::new(false, &[]);
        fsm.apply(K::Onboarding, t(0)).unwrap();
        assert_eq!(fsm.apply(K::Churn, t(5)), Err(Rejection::NotClosable));
    }

    #[test]
    fn timestamps_must_strictly_increase() {
        let mut fsm = EntityStateMachine::new(true, &[]);
        fsm.apply(K::Onboarding, t(0)).unwrap();
        assert!(matches!(
            fsm.apply(K::TierUpgrade, t(0)),
            Err(Rejection::OutOfOrder { .. })
        ));
    }

    #[test]
    fn onboarding_must_come_first() {
        let mut fsm = EntityStateMachine::new(true, &[]);
        assert!(fsm.apply(K::TierUpgrade, t(0)).is_err());
    }
}
