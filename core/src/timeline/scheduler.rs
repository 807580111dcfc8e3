//! Constraint-aware event scheduler.
//!
//! RULE: ONBOARDING is always first. DATA_DRIVEN events keep the exact
//! timestamps they arrive with. RANDOM events are only inserted when the
//! state machine accepts the whole resulting timeline.

use super::{
    event::{Channel, EventKind, LifecycleEvent, Provenance, ReviewStatus},
    state::{replay, DormancyWindow, EntityStateMachine, LifecycleState, Rejection},
};
use crate::{
    address::business_hours_time,
    config::TimelineConfig,
    error::{SynthError, SynthResult},
    horizon::Horizon,
    ids::{IdBlock, IdKind},
    names::NameGenerator,
    registry::{Entity, TIERS},
    rng::StreamRng,
    types::Timestamp,
};
use chrono::Duration;
use log::{debug, warn};
use serde_json::json;

pub struct EventScheduler<'a> {
    config: &'a TimelineConfig,
    horizon: Horizon,
}

impl<'a> EventScheduler<'a> {
    pub fn new(config: &'a TimelineConfig, horizon: Horizon) -> Self {
        Self { config, horizon }
    }

    /// Build the complete, ordered timeline for one entity.
    pub fn schedule(
        &self,
        entity: &Entity,
        data_driven: Vec<LifecycleEvent>,
        dormancy: &[DormancyWindow],
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) -> SynthResult<Vec<LifecycleEvent>> {
        let entity_id = entity.entity_id.as_str();
        let mut timeline = vec![LifecycleEvent::new(
            entity_id,
            EventKind::Onboarding,
            entity.onboarded_at,
            Provenance::DataDriven,
        )];

        let mut supplied = data_driven;
        supplied.sort_by_key(|e| e.timestamp);
        for event in supplied {
            if event.provenance != Provenance::DataDriven {
                return Err(SynthError::constraint(entity_id, "supplied event is not DATA_DRIVEN"));
            }
            if event.timestamp >= self.horizon.end {
                return Err(SynthError::constraint(
                    entity_id,
                    format!("{} at {} is past the horizon", event.kind.code(), event.timestamp),
                ));
            }
            if let Some(last) = timeline.last() {
                if event.timestamp <= last.timestamp {
                    return Err(SynthError::constraint(
                        entity_id,
                        format!("DATA_DRIVEN {} at {} collides with {}", event.kind.code(), event.timestamp, last.timestamp),
                    ));
                }
            }
            timeline.push(event);
        }
        replay(entity_id, &timeline, entity.closure_eligible, dormancy)?;

        let count = rng
            .weighted_index(&self.config.random_event_count_weights)
            .unwrap_or(0);
        let mut anchor = entity.active_from(&self.horizon);
        for _ in 0..count {
            let Some(at) = self.sample_instant(anchor, &timeline, rng) else {
                debug!("entity={entity_id} horizon exhausted after {} events", timeline.len());
                break;
            };
            anchor = at;
            self.place(entity, &mut timeline, at, dormancy, rng);
        }

        let states = replay(entity_id, &timeline, entity.closure_eligible, dormancy)?;
        self.decorate(entity, &mut timeline, &states, ids, rng);
        Ok(timeline)
    }

    /// Right-skewed offset from the anchor, bumped past any existing event.
    /// None once the horizon is exhausted.
    fn sample_instant(
        &self,
        anchor: Timestamp,
        timeline: &[LifecycleEvent],
        rng: &mut StreamRng,
    ) -> Option<Timestamp> {
        let c = self.config;
        let sigma = c.offset_sigma;
        let mu = c.offset_mean_days.ln() - sigma * sigma / 2.0;
        let days = rng
            .log_normal(mu, sigma)
            .round()
            .clamp(f64::from(c.offset_floor_days), f64::from(c.offset_cap_days)) as i64;

        let spacing = Duration::seconds(i64::from(c.min_spacing_secs));
        let mut at = (anchor.date() + Duration::days(days)).and_time(business_hours_time(rng));
        if at <= anchor {
            at = anchor + spacing;
        }
        while timeline.iter().any(|e| e.timestamp == at) {
            at += spacing;
        }
        (at < self.horizon.end).then_some(at)
    }

    /// Try up to `resample_attempts + 1` kinds at `at`. Drops the slot if
    /// none is legal.
    fn place(
        &self,
        entity: &Entity,
        timeline: &mut Vec<LifecycleEvent>,
        at: Timestamp,
        dormancy: &[DormancyWindow],
        rng: &mut StreamRng,
    ) -> bool {
        let weights = self.config.kind_weights.as_slice();
        let mut last_rejection = None;
        for _ in 0..=self.config.resample_attempts {
            let Some(i) = rng.weighted_index(&weights) else {
                return false;
            };
            let kind = EventKind::RANDOM[i];
            let candidate = LifecycleEvent::new(&entity.entity_id, kind, at, Provenance::Random);
            let pos = timeline.partition_point(|e| e.timestamp < at);
            timeline.insert(pos, candidate);
            match check(timeline, entity.closure_eligible, dormancy) {
                Ok(()) => return true,
                Err(r) => {
                    timeline.remove(pos);
                    last_rejection = Some(r);
                }
            }
        }
        if let Some(r) = last_rejection {
            warn!("entity={} dropped RANDOM event at {at}: {r}", entity.entity_id);
        }
        false
    }

    /// Assign ids in timeline order and fill channel, payload and review
    /// fields for every event the address stream did not already describe.
    /// Occupation and tier form one chain across RANDOM events and those
    /// mirroring customer updates.
    fn decorate(
        &self,
        entity: &Entity,
        timeline: &mut [LifecycleEvent],
        states: &[LifecycleState],
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) {
        let mut occupation = entity.occupation.clone();
        let mut tier = entity.initial_tier;

        for (event, &before) in timeline.iter_mut().zip(states) {

            event.event_id = ids.next(IdKind::Event);
            let mirrors_update = event.source_ref.is_some()
                && matches!(event.kind, EventKind::EmploymentChange | EventKind::TierUpgrade);
            event.channel = match event.kind {
                EventKind::Churn => Channel::System,
                _ if mirrors_update => Channel::System,
                _ => {
                    let i = rng.weighted_index(&Channel::WEIGHTS).unwrap_or(0);
                    Channel::ALL[i]
                }
            };
            if event.kind == EventKind::AddressChange && event.source_ref.is_some() {
                continue;
            }

            event.triggered_by = match (event.kind, event.channel) {
                (_, Channel::System) => "SYSTEM",
                (EventKind::Onboarding, _) => "ONBOARDING",
                _ => "CUSTOMER",
            }
            .to_string();

            let (previous, new, details) = match event.kind {
                EventKind::Onboarding => (
                    None,
                    Some("ACTIVE".to_string()),
                    json!({
                        "tier": TIERS[tier],
                        "occupation": occupation,
                        "accounts": entity.accounts.len(),
                    }),
                ),
                EventKind::EmploymentChange => {
                    let next = NameGenerator::next_occupation(rng, &occupation).to_string();
                    let previous = std::mem::replace(&mut occupation, next.clone());
                    (Some(previous), Some(next), field_details("occupation", event.source_ref.as_deref()))
                }
                EventKind::TierUpgrade => {
                    let previous = TIERS[tier].to_string();
                    tier = (tier + 1).min(TIERS.len() - 1);
                    (Some(previous), Some(TIERS[tier].to_string()), field_details("tier", event.source_ref.as_deref()))
                }
                EventKind::Closure | EventKind::Churn => (
                    Some(state_label(before).to_string()),
                    Some("CLOSED".to_string()),
                    json!({ "reason": closure_reason(event.kind, rng) }),
                ),
                EventKind::Reactivation => (
                    Some(state_label(before).to_string()),
                    Some("ACTIVE".to_string()),
                    json!({ "reactivated_from": state_label(before) }),
                ),
                EventKind::AddressChange => (None, None, json!({})),
            };
            event.payload.previous_value = previous;
            event.payload.new_value = new;
            event.payload.details = details;

            if matches!(event.kind, EventKind::Closure | EventKind::Reactivation) {
                event.requires_review = true;
                event.review_status = ReviewStatus::Approved;
                event.review_date = Some(event.timestamp.date() + Duration::days(1));
            }
            event.notes = notes_for(event.kind).to_string();
        }
    }
}

fn field_details(field: &str, update_id: Option<&str>) -> serde_json::Value {
    match update_id {
        Some(id) => json!({ "field": field, "update_id": id }),
        None => json!({ "field": field }),
    }
}

/// Replay the candidate timeline without building an error.
fn check(
    timeline: &[LifecycleEvent],
    closure_eligible: bool,
    dormancy: &[DormancyWindow],
) -> Result<(), Rejection> {
    let mut fsm = EntityStateMachine::new(closure_eligible, dormancy);
    for e in timeline {
        fsm.apply_event(e)?;
    }
    Ok(())
}

fn state_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Prospect => "PROSPECT",
        LifecycleState::Active => "ACTIVE",
        LifecycleState::Dormant => "DORMANT",
        LifecycleState::Closed => "CLOSED",
    }
}

fn closure_reason(kind: EventKind, rng: &mut StreamRng) -> &'static str {
    match kind {
        EventKind::Churn => *rng.pick(&["INACTIVITY", "COMPETITOR_SWITCH", "FEE_SENSITIVITY"]),
        _ => *rng.pick(&["CUSTOMER_REQUEST", "RELOCATION", "PRODUCT_CONSOLIDATION"]),
    }
}

fn notes_for(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Onboarding => "Customer onboarded",
        EventKind::AddressChange => "Address updated",
        EventKind::EmploymentChange => "Employment details updated",
        EventKind::TierUpgrade => "Relationship tier upgraded",
        EventKind::Closure => "Relationship closed at customer request",
        EventKind::Reactivation => "Relationship reactivated",
        EventKind::Churn => "Customer churned",
    }
}
