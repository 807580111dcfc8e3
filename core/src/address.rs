//! Address update stream.
//!
//! RULE: This is the source of truth for every ADDRESS_CHANGE instant.
//! The timestamps minted here are copied, never re-sampled, into the
//! lifecycle event stream (see linker.rs).

use crate::{
    config::AddressConfig,
    error::{SynthError, SynthResult},
    horizon::Horizon,
    ids::{IdBlock, IdKind},
    names::NameGenerator,
    registry::Entity,
    rng::StreamRng,
    types::{EntityId, Timestamp},
};
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    fn draw(rng: &mut StreamRng, country: &str) -> Self {
        let cities = NameGenerator::country(country)
            .map(|c| c.cities)
            .unwrap_or(&["Springfield"]);
        Self {
            line1: NameGenerator::street_line(rng),
            city: rng.pick(cities).to_string(),
            postal_code: NameGenerator::postal_code(rng),
            country: country.to_string(),
        }
    }

    /// Single-line rendering used as an event's old/new value.
    pub fn one_line(&self) -> String {
        format!("{}, {} {}, {}", self.line1, self.postal_code, self.city, self.country)
    }
}

/// One SCD2 version of a customer's address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address_id: String,
    pub entity_id: EntityId,
    pub address: Address,
    pub effective_from: Timestamp,
    pub effective_to: Option<Timestamp>,
}

impl AddressRecord {
    pub fn is_current(&self) -> bool {
        self.effective_to.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddressHistory {
    records: Vec<AddressRecord>,
}

impl AddressHistory {
    /// Initial address from onboarding plus zero or more updates, each on a
    /// distinct business-hours instant inside the horizon.
    pub fn generate(
        entity: &Entity,
        horizon: &Horizon,
        config: &AddressConfig,
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) -> SynthResult<Self> {
        let mut records = vec![AddressRecord {
            address_id: ids.next(IdKind::Address),
            entity_id: entity.entity_id.clone(),
            address: Address::draw(rng, &entity.country),
            effective_from: entity.onboarded_at,
            effective_to: None,
        }];

        // Updates start the day after onboarding so they can never tie with it.
        let first_day = (entity.onboarded_at.date() + Duration::days(1)).max(horizon.start_date());
        let last_day = horizon.last_date();
        if first_day <= last_day {
            let span_days = (last_day - first_day).num_days() + 1;
            let expected = config.updates_per_year * span_days as f64 / 365.0;
            let count = rng.poisson(expected).min(config.max_updates) as i64;

            let mut offsets: Vec<i64> = (0..count)
                .map(|_| rng.range_inclusive(0, span_days - 1))
                .collect();
            offsets.sort_unstable();
            offsets.dedup();

            for offset in offsets {
                let date = first_day + Duration::days(offset);
                let at = date.and_time(business_hours_time(rng));
                let previous = records.last().map(|r| r.address.country.clone()).unwrap_or_default();
                let country = if rng.chance(config.cross_border_share) {
                    NameGenerator::foreign_country(rng, &previous).code.to_string()
                } else {
                    previous
                };
                if let Some(last) = records.last_mut() {
                    last.effective_to = Some(at);
                }
                records.push(AddressRecord {
                    address_id: ids.next(IdKind::Address),
                    entity_id: entity.entity_id.clone(),
                    address: Address::draw(rng, &country),
                    effective_from: at,
                    effective_to: None,
                });
            }
        }

        let history = Self { records };
        history.validate()?;
        Ok(history)
    }

    pub fn from_records(records: Vec<AddressRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[AddressRecord] {
        &self.records
    }

    pub fn current(&self) -> Option<&AddressRecord> {
        self.records.last()
    }

    /// Every (previous, new) pair. One per ADDRESS_CHANGE.
    pub fn changes(&self) -> impl Iterator<Item = (&AddressRecord, &AddressRecord)> {
        self.records.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Contiguity: ordered, gapless, exactly one open record.
    pub fn validate(&self) -> SynthResult<()> {
        let entity_id = self.records.first().map(|r| r.entity_id.as_str()).unwrap_or("");
        if self.records.is_empty() {
            return Err(SynthError::constraint(entity_id, "address history is empty"));
        }
        for pair in self.records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.effective_to != Some(b.effective_from) {
                return Err(SynthError::constraint(
                    entity_id,
                    format!("address {} does not end where {} begins", a.address_id, b.address_id),
                ));
            }
            if b.effective_from <= a.effective_from {
                return Err(SynthError::constraint(
                    entity_id,
                    format!("address {} is not after {}", b.address_id, a.address_id),
                ));
            }
        }
        let open = self.records.iter().filter(|r| r.is_current()).count();
        if open != 1 || !self.records.last().is_some_and(|r| r.is_current()) {
            return Err(SynthError::constraint(
                entity_id,
                format!("address history has {open} open records"),
            ));
        }
        Ok(())
    }
}

/// 09:00:00 to 17:59:59.999999, microsecond precision.
pub fn business_hours_time(rng: &mut StreamRng) -> NaiveTime {
    let hour = rng.range_inclusive(9, 17) as u32;
    let minute = rng.range_inclusive(0, 59) as u32;
    let second = rng.range_inclusive(0, 59) as u32;
    let micro = rng.range_inclusive(0, 999_999) as u32;
    NaiveTime::from_hms_micro_opt(hour, minute, second, micro).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};
    use chrono::NaiveDate;

    fn busy_config() -> AddressConfig {
        AddressConfig {
            updates_per_year: 3.0,
            max_updates: 6,
            cross_border_share: 0.5,
        }
    }

    #[test]
    fn history_is_contiguous_with_one_open_record() {
        let horizon = Horizon::new(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), 720);
        let bank = RngBank::new(5);
        for i in 0..20 {
            let entity = Entity::new(i, horizon.start - Duration::days(100), true);
            let mut ids = IdBlock::for_entity(i);
            let history = AddressHistory::generate(
                &entity,
                &horizon,
                &busy_config(),
                &mut ids,
                &mut bank.for_entity(i, StreamSlot::Address),
            )
            .unwrap();
            history.validate().unwrap();
            assert_eq!(history.records()[0].effective_from, entity.onboarded_at);
            for r in &history.records()[1..] {
                assert!(horizon.contains(&r.effective_from));
            }
        }
    }

    #[test]
    fn gap_is_rejected() {
        let horizon = Horizon::new(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), 365);
        let entity = Entity::new(0, horizon.start, true);
        let mut ids = IdBlock::for_entity(0);
        let mut rng = RngBank::new(5).for_entity(0, StreamSlot::Address);
        let mut records = AddressHistory::generate(&entity, &horizon, &busy_config(), &mut ids, &mut rng)
            .unwrap()
            .records()
            .to_vec();
        records.push(AddressRecord {
            effective_from: horizon.end,
            ..records[0].clone()
        });
        assert!(matches!(
            AddressHistory::from_records(records).validate(),
            Err(SynthError::ConstraintViolation { .. })
        ));
    }
}
