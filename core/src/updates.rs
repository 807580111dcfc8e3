//! Customer update stream: employment and tier changes recorded by
//! upstream systems.
//!
//! RULE: This is the source of truth for every DATA_DRIVEN
//! EMPLOYMENT_CHANGE and TIER_UPGRADE instant. The linker copies each
//! `effective_at` into the event stream unchanged.
//! RULE: No update falls inside a dormancy window or shares an instant with
//! an address update.
//! RULE: Field values are settled in timeline order, after RANDOM events are
//! placed, so one occupation and tier chain runs through both streams.

use crate::{
    address::business_hours_time,
    config::UpdateConfig,
    error::{SynthError, SynthResult},
    horizon::Horizon,
    ids::{IdBlock, IdKind},
    registry::{Entity, TIERS},
    rng::StreamRng,
    timeline::{DormancyWindow, EventKind},
    types::{EntityId, Timestamp},
};
use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    Employment,
    Tier,
}

impl UpdateKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Employment => "EMPLOYMENT",
            Self::Tier => "ACCOUNT_TIER",
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::Employment => EventKind::EmploymentChange,
            Self::Tier => EventKind::TierUpgrade,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    pub update_id: String,
    pub entity_id: EntityId,
    pub kind: UpdateKind,
    /// Microsecond precision, business hours.
    pub effective_at: Timestamp,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
}

/// Zero or more updates on distinct days after onboarding, ordered by
/// instant. `taken` holds instants already claimed by other sources.
pub fn generate(
    entity: &Entity,
    horizon: &Horizon,
    config: &UpdateConfig,
    dormancy: &[DormancyWindow],
    taken: &[Timestamp],
    ids: &mut IdBlock,
    rng: &mut StreamRng,
) -> Vec<CustomerUpdate> {
    let first_day = (entity.onboarded_at.date() + Duration::days(1)).max(horizon.start_date());
    let last_day = horizon.last_date();
    if first_day > last_day {
        return Vec::new();
    }
    let span_days = (last_day - first_day).num_days() + 1;
    let expected = config.updates_per_year * span_days as f64 / 365.0;
    let count = rng.poisson(expected).min(config.max_updates) as i64;

    let mut offsets: Vec<i64> = (0..count)
        .map(|_| rng.range_inclusive(0, span_days - 1))
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    // Tier changes are upgrades only, so the headroom above the starting
    // tier bounds how many the stream may carry.
    let mut tier_headroom = (TIERS.len() - 1).saturating_sub(entity.initial_tier);
    let mut updates = Vec::with_capacity(offsets.len());
    for offset in offsets {
        let date = first_day + Duration::days(offset);
        let mut at = date.and_time(business_hours_time(rng));
        while taken.contains(&at) {
            at += Duration::seconds(1);
        }
        let wants_employment = rng.chance(config.employment_share);
        if at >= horizon.end || dormancy.iter().any(|w| w.contains(&at)) {
            debug!("entity={} update slot at {at} skipped", entity.entity_id);
            continue;
        }
        let kind = if wants_employment || tier_headroom == 0 {
            UpdateKind::Employment
        } else {
            tier_headroom -= 1;
            UpdateKind::Tier
        };
        updates.push(CustomerUpdate {
            update_id: ids.next(IdKind::Update),
            entity_id: entity.entity_id.clone(),
            kind,
            effective_at: at,
            previous_value: None,
            new_value: None,
        });
    }
    updates
}

/// Ordered, unique instants, each after onboarding and outside every
/// dormancy window.
pub fn validate(
    entity: &Entity,
    updates: &[CustomerUpdate],
    dormancy: &[DormancyWindow],
) -> SynthResult<()> {
    let id = entity.entity_id.as_str();
    for pair in updates.windows(2) {
        if pair[1].effective_at <= pair[0].effective_at {
            return Err(SynthError::constraint(
                id,
                format!("update {} is not after {}", pair[1].update_id, pair[0].update_id),
            ));
        }
    }
    for u in updates {
        if u.effective_at <= entity.onboarded_at {
            return Err(SynthError::constraint(id, format!("update {} precedes onboarding", u.update_id)));
        }
        if dormancy.iter().any(|w| w.contains(&u.effective_at)) {
            return Err(SynthError::constraint(
                id,
                format!("update {} at {} falls in a dormancy window", u.update_id, u.effective_at),
            ));
        }
        if u.previous_value.is_none() || u.new_value.is_none() {
            return Err(SynthError::constraint(id, format!("update {} was never settled", u.update_id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};
    use chrono::NaiveDate;

    fn busy() -> UpdateConfig {
        UpdateConfig {
            updates_per_year: 4.0,
            max_updates: 8,
            employment_share: 0.5,
        }
    }

    fn horizon() -> Horizon {
        Horizon::new(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), 720)
    }

    #[test]
    fn updates_are_ordered_and_inside_the_lifetime() {
        let horizon = horizon();
        let bank = RngBank::new(11);
        for i in 0..20 {
            let entity = Entity::new(i, horizon.start + Duration::days(i64::from(i) * 10), true);
            let updates = generate(
                &entity,
                &horizon,
                &busy(),
                &[],
                &[],
                &mut IdBlock::for_entity(i),
                &mut bank.for_entity(i, StreamSlot::Update),
            );
            for pair in updates.windows(2) {
                assert!(pair[0].effective_at.date() < pair[1].effective_at.date());
            }
            for u in &updates {
                assert!(u.effective_at > entity.onboarded_at);
                assert!(horizon.contains(&u.effective_at));
                assert!(u.update_id.starts_with("UPD_"));
            }
        }
    }

    #[test]
    fn dormancy_windows_and_taken_instants_are_avoided() {
        let horizon = horizon();
        let bank = RngBank::new(3);
        let window = DormancyWindow {
            start: horizon.start + Duration::days(100),
            end: horizon.start + Duration::days(400),
        };
        for i in 0..20 {
            let entity = Entity::new(i, horizon.start, true);
            let first = generate(
                &entity,
                &horizon,
                &busy(),
                &[],
                &[],
                &mut IdBlock::for_entity(i),
                &mut bank.for_entity(i, StreamSlot::Update),
            );
            let taken: Vec<Timestamp> = first.iter().map(|u| u.effective_at).collect();
            let second = generate(
                &entity,
                &horizon,
                &busy(),
                &[window],
                &taken,
                &mut IdBlock::for_entity(i),
                &mut bank.for_entity(i, StreamSlot::Update),
            );
            for u in &second {
                assert!(!window.contains(&u.effective_at), "{} inside the window", u.update_id);
                assert!(!taken.contains(&u.effective_at), "{} reuses a taken instant", u.update_id);
            }
        }
    }

    #[test]
    fn tier_updates_stop_at_the_top_tier() {
        let horizon = horizon();
        let config = UpdateConfig {
            updates_per_year: 20.0,
            max_updates: 30,
            employment_share: 0.0,
        };
        let mut entity = Entity::new(0, horizon.start, true);
        entity.initial_tier = TIERS.len() - 2;
        let updates = generate(
            &entity,
            &horizon,
            &config,
            &[],
            &[],
            &mut IdBlock::for_entity(0),
            &mut RngBank::new(8).for_entity(0, StreamSlot::Update),
        );
        assert!(updates.len() > 1);
        assert_eq!(updates.iter().filter(|u| u.kind == UpdateKind::Tier).count(), 1);
    }
}
