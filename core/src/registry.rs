//! Entity registry: the immutable facts every timeline is seeded from.
//!
//! RULE: An Entity never changes after seeding. Its lifetime runs from the
//! onboarding instant to the horizon end and never shrinks.

use crate::{
    config::SynthConfig,
    horizon::Horizon,
    names::NameGenerator,
    rng::{RngBank, StreamRng, StreamSlot},
    types::{EntityId, EntityIndex, Timestamp},
};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Relationship tiers, lowest first. TIER_UPGRADE moves one step up.
pub const TIERS: [&str; 6] = ["BASIC", "STANDARD", "SILVER", "GOLD", "PLATINUM", "PRIVATE"];

/// Onboarding always happens at 10:00 on the onboarding date.
pub fn onboarding_time() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Checking,
    Savings,
    Business,
    Investment,
}

impl AccountType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Checking => "CHECKING",
            Self::Savings => "SAVINGS",
            Self::Business => "BUSINESS",
            Self::Investment => "INVESTMENT",
        }
    }

    /// Relative share of a customer's transactions booked on this account.
    pub fn activity_weight(&self) -> f64 {
        match self {
            Self::Checking => 0.6,
            Self::Savings => 0.2,
            Self::Business => 0.15,
            Self::Investment => 0.05,
        }
    }

    /// Chance a customer holds this account type. Checking is always held.
    fn holding_probability(&self) -> f64 {
        match self {
            Self::Checking => 1.0,
            Self::Savings => 0.5,
            Self::Business => 0.2,
            Self::Investment => 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub entity_id: EntityId,
    pub account_type: AccountType,
    pub currency: String,
    pub opened_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub index: EntityIndex,
    pub entity_id: EntityId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub occupation: String,
    /// Index into TIERS.
    pub initial_tier: usize,
    pub country: String,
    pub currency: String,
    pub onboarded_at: Timestamp,
    /// False for customers that may never close or churn.
    pub closure_eligible: bool,
    pub accounts: Vec<Account>,
}

impl Entity {
    /// A plain customer with a single checking account. Used when the
    /// caller controls onboarding directly.
    pub fn new(index: EntityIndex, onboarded_at: Timestamp, closure_eligible: bool) -> Self {
        let entity_id = entity_id_for(index);
        let account = Account {
            account_id: format!("{entity_id}_CHECKING_01"),
            entity_id: entity_id.clone(),
            account_type: AccountType::Checking,
            currency: "USD".to_string(),
            opened_at: onboarded_at,
        };
        Self {
            index,
            entity_id,
            first_name: "Alex".to_string(),
            last_name: "Morgan".to_string(),
            date_of_birth: onboarded_at.date() - Duration::days(35 * 365),
            occupation: "Engineer".to_string(),
            initial_tier: 1,
            country: "US".to_string(),
            currency: "USD".to_string(),
            onboarded_at,
            closure_eligible,
            accounts: vec![account],
        }
    }

    /// Start of the part of the lifetime that lies inside the horizon.
    pub fn active_from(&self, horizon: &Horizon) -> Timestamp {
        self.onboarded_at.max(horizon.start)
    }

    /// Pick the account a transaction books against.
    pub fn pick_account(&self, rng: &mut StreamRng) -> &Account {
        let weights: Vec<f64> = self
            .accounts
            .iter()
            .map(|a| a.account_type.activity_weight())
            .collect();
        let i = rng.weighted_index(&weights).unwrap_or(0);
        &self.accounts[i]
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

pub fn entity_id_for(index: EntityIndex) -> EntityId {
    format!("CUST_{:05}", index + 1)
}

pub struct EntityRegistry {
    entities: Vec<Entity>,
}

impl EntityRegistry {
    /// Seed the whole population. Each entity draws from its own stream,
    /// so entity i is the same whatever the population size.
    pub fn seed(config: &SynthConfig, bank: &RngBank) -> Self {
        let horizon = config.horizon();
        // Validation keeps population_size inside the index range.
        let size = EntityIndex::try_from(config.population_size).unwrap_or(EntityIndex::MAX);
        let entities = (0..size)
            .map(|i| seed_entity(i, config, &horizon, &mut bank.for_entity(i, StreamSlot::Registry)))
            .collect();
        Self { entities }
    }

    pub fn from_entities(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, index: EntityIndex) -> Option<&Entity> {
        self.entities.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn seed_entity(
    index: EntityIndex,
    config: &SynthConfig,
    horizon: &Horizon,
    rng: &mut StreamRng,
) -> Entity {
    let entity_id = entity_id_for(index);
    let rc = &config.registry;
    let start = horizon.start_date();

    let onboarding_date = if rng.chance(rc.pre_horizon_onboarding_share) {
        let back = rng.range_inclusive(
            i64::from(rc.pre_horizon_min_days),
            i64::from(rc.pre_horizon_max_days),
        );
        start - Duration::days(back)
    } else {
        start + Duration::days(rng.range_inclusive(0, horizon.days() - 1))
    };
    let onboarded_at = onboarding_date.and_time(onboarding_time());

    let first_name = NameGenerator::first_name(rng).to_string();
    let last_name = NameGenerator::last_name(rng).to_string();
    let age_days = rng.range_inclusive(18 * 365, 80 * 365);
    let date_of_birth = start - Duration::days(age_days);
    let occupation = NameGenerator::occupation(rng).to_string();
    let initial_tier = rng.range_inclusive(0, 2) as usize;
    let country = NameGenerator::home_country(rng);
    let closure_eligible = !rng.chance(rc.closure_ineligible_share);

    let mut accounts = Vec::new();
    for account_type in [
        AccountType::Checking,
        AccountType::Savings,
        AccountType::Business,
        AccountType::Investment,
    ] {
        if rng.chance(account_type.holding_probability()) {
            accounts.push(Account {
                account_id: format!("{entity_id}_{}_01", account_type.code()),
                entity_id: entity_id.clone(),
                account_type,
                currency: country.currency.to_string(),
                opened_at: onboarded_at,
            });
        }
    }

    Entity {
        index,
        entity_id,
        first_name,
        last_name,
        date_of_birth,
        occupation,
        initial_tier,
        country: country.code.to_string(),
        currency: country.currency.to_string(),
        onboarded_at,
        closure_eligible,
        accounts,
    }
}
