//! Baseline transaction stream and the dormancy windows derived from it.
//!
//! The baseline is what a customer looks like before any anomaly is
//! injected. Dormancy windows come from gaps in this baseline and are
//! handed to the scheduler.

use crate::{
    config::TransactionConfig,
    horizon::{add_business_days, is_business_day, Horizon},
    ids::{IdBlock, IdKind},
    registry::Entity,
    rng::StreamRng,
    timeline::DormancyWindow,
    types::{EntityId, Timestamp},
};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }

    fn sign(&self) -> f64 {
        match self {
            Self::Credit => 1.0,
            Self::Debit => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub entity_id: EntityId,
    pub account_id: String,
    pub timestamp: Timestamp,
    pub value_date: NaiveDate,
    /// Signed: debits are negative.
    pub amount: f64,
    pub currency: String,
    /// Units of `currency` per USD.
    pub fx_rate: f64,
    pub base_amount_usd: f64,
    pub direction: Direction,
    pub counterparty: String,
    pub description: String,
}

impl Transaction {
    pub fn abs_amount(&self) -> f64 {
        self.amount.abs()
    }

    /// Replace the magnitude, keeping the direction, and reprice in USD.
    pub fn set_abs_amount(&mut self, value: f64) {
        self.amount = round_cents(value.abs()) * self.direction.sign();
        self.base_amount_usd = round_cents(self.amount / self.fx_rate);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        let magnitude = self.abs_amount();
        self.direction = direction;
        self.set_abs_amount(magnitude);
    }
}

/// Units of `currency` per USD. Unknown currencies price at par.
pub fn usd_rate(currency: &str) -> f64 {
    match currency {
        "EUR" => 0.85,
        "GBP" => 0.75,
        "JPY" => 150.0,
        "CAD" => 1.35,
        _ => 1.0,
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

const CREDIT_PREFIXES: [&str; 5] = ["PAYROLL_", "VENDOR_", "CLIENT_", "INVEST_", "BANK_"];
const DEBIT_PREFIXES: [&str; 5] = ["SUPPLIER_", "UTILITY_", "LOAN_", "INVEST_", "TRANSFER_"];
const CREDIT_DESCRIPTIONS: [&str; 5] = [
    "Salary payment",
    "Invoice settlement",
    "Client payment",
    "Investment return",
    "Refund received",
];
const DEBIT_DESCRIPTIONS: [&str; 5] = [
    "Supplier payment",
    "Utility bill",
    "Loan repayment",
    "Investment purchase",
    "Transfer out",
];

/// Booking hours 14:00 to 21:59, peaking late afternoon.
const BOOKING_HOURS: [u32; 8] = [14, 15, 16, 17, 18, 19, 20, 21];
const BOOKING_HOUR_WEIGHTS: [f64; 8] = [1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 4.0, 3.0];

const MAX_PER_DAY: u32 = 8;
const EMPTY_DAY_NUDGE: f64 = 0.3;
const BUSINESS_DAYS_PER_MONTH: f64 = 22.0;

pub struct TransactionGenerator<'a> {
    config: &'a TransactionConfig,
    horizon: Horizon,
}

impl<'a> TransactionGenerator<'a> {
    pub fn new(config: &'a TransactionConfig, horizon: Horizon) -> Self {
        Self { config, horizon }
    }

    /// Business-day baseline for one entity, ordered by timestamp.
    pub fn generate(&self, entity: &Entity, ids: &mut IdBlock, rng: &mut StreamRng) -> Vec<Transaction> {
        let first = entity.active_from(&self.horizon).date();
        let last = self.horizon.last_date();
        if first > last {
            return Vec::new();
        }

        let quiet = self.quiet_spell(first, last, rng);
        let daily_rate = self.config.avg_per_month / BUSINESS_DAYS_PER_MONTH;
        let mut out = Vec::new();

        let mut date = first;
        while date <= last {
            let silent = quiet.is_some_and(|(from, to)| date >= from && date < to);
            if is_business_day(date) && !silent {
                let mut count = rng.poisson(daily_rate);
                if count == 0 && rng.chance(EMPTY_DAY_NUDGE) {
                    count = 1;
                }
                let mut times: Vec<NaiveTime> =
                    (0..count.min(MAX_PER_DAY)).map(|_| booking_time(rng)).collect();
                times.sort();
                for time in times {
                    let at = date.and_time(time);
                    if at <= entity.onboarded_at {
                        continue;
                    }
                    out.push(self.baseline_transaction(entity, at, ids, rng));
                }
            }
            date += Duration::days(1);
        }
        out
    }

    /// One ordinary-looking transaction at `at`.
    pub fn baseline_transaction(
        &self,
        entity: &Entity,
        at: Timestamp,
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) -> Transaction {
        let direction = if rng.chance(0.5) { Direction::Credit } else { Direction::Debit };
        let account_id = entity.pick_account(rng).account_id.clone();
        let currency = rng.pick(&self.config.currencies).clone();
        let magnitude = rng
            .log_normal(6.5, 1.2)
            .clamp(self.config.min_amount, self.config.max_amount);
        let magnitude = round_cents(magnitude);

        let (prefixes, descriptions) = match direction {
            Direction::Credit => (&CREDIT_PREFIXES, &CREDIT_DESCRIPTIONS),
            Direction::Debit => (&DEBIT_PREFIXES, &DEBIT_DESCRIPTIONS),
        };
        let counterparty = format!("{}{:010}", rng.pick(prefixes), rng.next_u64_below(10_000_000_000));
        let base = *rng.pick(descriptions);
        let description = if magnitude > 10_000.0 {
            format!("Large {}", base.to_lowercase())
        } else if magnitude > 5_000.0 {
            format!("Substantial {}", base.to_lowercase())
        } else {
            base.to_string()
        };

        let mut settle_days = if magnitude > 10_000.0 {
            2
        } else if currency != "USD" {
            1
        } else {
            0
        };
        if rng.chance(0.2) {
            settle_days += 1;
        }
        let value_date = add_business_days(at.date(), settle_days.min(3));

        let fx_rate = usd_rate(&currency);
        let mut txn = Transaction {
            transaction_id: ids.next(IdKind::Transaction),
            entity_id: entity.entity_id.clone(),
            account_id,
            timestamp: at,
            value_date,
            amount: 0.0,
            currency,
            fx_rate,
            base_amount_usd: 0.0,
            direction,
            counterparty,
            description,
        };
        txn.set_abs_amount(magnitude);
        txn
    }

    fn quiet_spell(&self, first: NaiveDate, last: NaiveDate, rng: &mut StreamRng) -> Option<(NaiveDate, NaiveDate)> {
        if !rng.chance(self.config.quiet_spell_probability) {
            return None;
        }
        let span = (last - first).num_days();
        let length = rng.range_inclusive(
            i64::from(self.config.quiet_spell_min_days),
            i64::from(self.config.quiet_spell_max_days),
        );
        let start = first + Duration::days(rng.range_inclusive(0, span.max(0)));
        Some((start, start + Duration::days(length)))
    }
}

fn booking_time(rng: &mut StreamRng) -> NaiveTime {
    let hour = BOOKING_HOURS[rng.weighted_index(&BOOKING_HOUR_WEIGHTS).unwrap_or(0)];
    let minute = rng.range_inclusive(0, 59) as u32;
    let second = rng.range_inclusive(0, 59) as u32;
    let micro = rng.range_inclusive(0, 999_999) as u32;
    NaiveTime::from_hms_micro_opt(hour, minute, second, micro).unwrap_or(NaiveTime::MIN)
}

/// Spans of more than `threshold_days` without activity.
///
/// Activity starts at the later of onboarding and horizon start. A window
/// opens `threshold_days` after the last activity and runs until the next
/// one, or to the horizon end.
pub fn dormancy_windows(
    entity: &Entity,
    transactions: &[Transaction],
    horizon: &Horizon,
    threshold_days: u32,
) -> Vec<DormancyWindow> {
    let threshold = Duration::days(i64::from(threshold_days));
    let mut points: Vec<Timestamp> = Vec::with_capacity(transactions.len() + 1);
    points.push(entity.active_from(horizon));
    points.extend(transactions.iter().map(|t| t.timestamp));
    points.sort();
    points.push(horizon.end);

    points
        .windows(2)
        .filter_map(|w| {
            let start = w[0] + threshold;
            (start < w[1]).then_some(DormancyWindow { start, end: w[1] })
        })
        .collect()
}
