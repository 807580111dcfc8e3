//! Pattern injection for one flagged entity.
//!
//! RULE: Every mutated or inserted transaction gets exactly one label, and
//! every labelled transaction lies inside the entity's cluster window.
//! Labelled amounts strictly increase in timestamp order.

use super::{label::AnomalyLabel, pattern::PatternKind};
use crate::{
    config::{AnomalyConfig, TransactionConfig},
    error::{SynthError, SynthResult},
    horizon::{add_business_days, next_weekend_day, Horizon},
    ids::IdBlock,
    registry::Entity,
    rng::StreamRng,
    transactions::{round_cents, usd_rate, Direction, Transaction, TransactionGenerator},
    types::Timestamp,
};
use chrono::{Duration, NaiveTime};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use uuid::Builder;

const SUSPICIOUS_PREFIXES: [&str; 5] = ["OFF_SHORE_", "SHELL_CORP_", "CRYPTO_EX_", "CASH_SERV_", "MONEY_TRANS_"];
const ROUND_FIGURES: [f64; 6] = [1_000.0, 5_000.0, 10_000.0, 25_000.0, 50_000.0, 100_000.0];
const OFF_HOURS: [u32; 7] = [23, 0, 1, 2, 3, 4, 5];
const WEEKEND_RULE_PROBABILITY: f64 = 0.25;
/// Longest HIGH_FREQUENCY burst.
const BURST_SPAN_HOURS: i64 = 20;

/// The bounded span all of one entity's injections fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl ClusterWindow {
    pub fn contains(&self, ts: &Timestamp) -> bool {
        *ts >= self.start && *ts < self.end
    }

    fn random_instant(&self, rng: &mut StreamRng) -> Timestamp {
        let micros = (self.end - self.start).num_microseconds().unwrap_or(1).max(1);
        self.start + Duration::microseconds(rng.range_inclusive(0, micros - 1))
    }
}

/// Per-entity draws shared by every pattern.
struct EntityPlan {
    window: ClusterWindow,
    threshold: f64,
    suspicious: Vec<String>,
    quotas: Vec<(PatternKind, u32)>,
}

pub struct AnomalyInjector<'a> {
    config: &'a AnomalyConfig,
    baseline: TransactionGenerator<'a>,
    horizon: Horizon,
}

impl<'a> AnomalyInjector<'a> {
    pub fn new(config: &'a AnomalyConfig, transactions: &'a TransactionConfig, horizon: Horizon) -> Self {
        Self {
            config,
            baseline: TransactionGenerator::new(transactions, horizon),
            horizon,
        }
    }

    /// Mutate and extend `transactions` in place and return the labels.
    /// The stream is left ordered by timestamp.
    pub fn inject(
        &self,
        entity: &Entity,
        run_id: &str,
        transactions: &mut Vec<Transaction>,
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) -> SynthResult<Vec<AnomalyLabel>> {
        let plan = self.plan(entity, transactions, rng)?;
        debug!(
            "entity={} cluster={}..{} patterns={:?}",
            entity.entity_id, plan.window.start, plan.window.end, plan.quotas
        );

        let mut targets: BTreeMap<usize, Vec<PatternKind>> = BTreeMap::new();
        for &(pattern, quota) in &plan.quotas {
            if pattern.inserts_transactions() {
                for txn in self.insert_burst(entity, pattern, quota, &plan, ids, rng) {
                    targets.insert(transactions.len(), vec![pattern]);
                    transactions.push(txn);
                }
            } else {
                for idx in self.pick_targets(entity, pattern, quota, &plan, transactions, &targets, ids, rng) {
                    targets.entry(idx).or_default().push(pattern);
                }
            }
        }

        let mut history: HashSet<String> = transactions.iter().map(|t| t.counterparty.clone()).collect();
        for (&idx, patterns) in targets.iter_mut() {
            patterns.sort();
            for &pattern in patterns.iter() {
                self.apply(pattern, patterns, &mut transactions[idx], &plan, &mut history, rng);
            }
        }

        self.escalate(transactions, &targets);

        if self.config.description_markers {
            for (&idx, patterns) in &targets {
                let txn = &mut transactions[idx];
                for p in patterns {
                    txn.description.push(' ');
                    txn.description.push_str(p.marker());
                }
            }
        }

        let labelled: HashSet<String> = targets
            .keys()
            .map(|&i| transactions[i].transaction_id.clone())
            .collect();
        let patterns_by_id: BTreeMap<String, Vec<PatternKind>> = targets
            .iter()
            .map(|(&i, p)| (transactions[i].transaction_id.clone(), p.clone()))
            .collect();

        transactions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });

        let mut labels = Vec::with_capacity(labelled.len());
        for txn in transactions.iter().filter(|t| labelled.contains(&t.transaction_id)) {
            if !plan.window.contains(&txn.timestamp) {
                return Err(SynthError::constraint(
                    &entity.entity_id,
                    format!("injected {} escaped its cluster window", txn.transaction_id),
                ));
            }
            labels.push(AnomalyLabel {
                label_id: Builder::from_random_bytes(rng.next_bytes16()).into_uuid().to_string(),
                run_id: run_id.to_string(),
                transaction_id: txn.transaction_id.clone(),
                entity_id: entity.entity_id.clone(),
                patterns: patterns_by_id.get(&txn.transaction_id).cloned().unwrap_or_default(),
                intensity: (txn.abs_amount() / plan.threshold * 10_000.0).round() / 10_000.0,
                injected_at: txn.timestamp,
                cluster_start: plan.window.start,
                cluster_end: plan.window.end,
            });
        }
        Ok(labels)
    }

    fn plan(&self, entity: &Entity, transactions: &[Transaction], rng: &mut StreamRng) -> SynthResult<EntityPlan> {
        let c = self.config;
        let span_start = entity.active_from(&self.horizon);
        let span_end = self.horizon.end;
        if span_start >= span_end {
            return Err(SynthError::constraint(&entity.entity_id, "no lifetime inside the horizon"));
        }

        let span = span_end - span_start;
        let length = Duration::days(i64::from(c.cluster_window_days)).min(span);
        let slack = (span - length).num_seconds();
        let start = span_start + Duration::seconds(rng.range_inclusive(0, slack.max(0)));
        let window = ClusterWindow { start, end: (start + length).min(span_end) };

        let mean = if transactions.is_empty() {
            6.5f64.exp()
        } else {
            transactions.iter().map(|t| t.abs_amount()).sum::<f64>() / transactions.len() as f64
        };
        let threshold = round_cents((mean * rng.uniform(c.multiplier_min, c.multiplier_max)).max(c.materiality_floor));

        let suspicious = (0..rng.range_inclusive(1, 3))
            .map(|_| format!("{}{:07}", rng.pick(&SUSPICIOUS_PREFIXES), rng.next_u64_below(10_000_000)))
            .collect();

        let smallest = c.catalog.iter().map(|p| p.min_transactions()).min().unwrap_or(1);
        let budget = rng.range_inclusive(i64::from(smallest), i64::from(c.max_per_entity)) as u32;
        let eligible: Vec<PatternKind> = c
            .catalog
            .iter()
            .copied()
            .filter(|p| p.min_transactions() <= budget)
            .collect();
        if eligible.is_empty() {
            return Err(SynthError::constraint(&entity.entity_id, "no pattern fits the anomaly budget"));
        }

        let mut chosen = vec![*rng.pick(&eligible)];
        let mut used = chosen[0].min_transactions();
        for _ in 0..2 {
            if !rng.chance(c.mixing_probability) {
                break;
            }
            let options: Vec<PatternKind> = eligible
                .iter()
                .copied()
                .filter(|p| !chosen.contains(p) && used + p.min_transactions() <= budget)
                .collect();
            if options.is_empty() {
                break;
            }
            let extra = *rng.pick(&options);
            used += extra.min_transactions();
            chosen.push(extra);
        }
        chosen.sort();

        let mut quotas: Vec<(PatternKind, u32)> = chosen.iter().map(|p| (*p, p.min_transactions())).collect();
        let mut leftover = budget - used;
        let mut i = 0;
        while leftover > 0 {
            let slot = i % quotas.len();
            quotas[slot].1 += 1;
            leftover -= 1;
            i += 1;
        }

        Ok(EntityPlan { window, threshold, suspicious, quotas })
    }

    /// Large-amount ceiling in the transaction's currency, leaving room for
    /// every escalation step.
    fn large_cap(&self, currency: &str) -> f64 {
        let headroom = (1.0 + self.config.escalation_step).powi(self.config.max_per_entity as i32);
        self.config.realistic_cap_usd * usd_rate(currency) / headroom
    }

    /// HIGH_FREQUENCY and RAPID_SUCCESSION bursts of new transactions.
    fn insert_burst(
        &self,
        entity: &Entity,
        pattern: PatternKind,
        count: u32,
        plan: &EntityPlan,
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) -> Vec<Transaction> {
        let window_len = plan.window.end - plan.window.start;
        let offsets: Vec<Duration> = match pattern {
            PatternKind::RapidSuccession => {
                let mut at = Duration::zero();
                (0..count)
                    .map(|i| {
                        if i > 0 {
                            at += Duration::seconds(rng.range_inclusive(5 * 60, 30 * 60));
                        }
                        at
                    })
                    .collect()
            }
            _ => {
                let burst = Duration::hours(BURST_SPAN_HOURS).min(window_len);
                let secs = burst.num_seconds().max(i64::from(count));
                let mut picks: Vec<i64> = (0..count).map(|_| rng.range_inclusive(0, secs - 1)).collect();
                picks.sort_unstable();
                for i in 1..picks.len() {
                    if picks[i] <= picks[i - 1] {
                        picks[i] = picks[i - 1] + 1;
                    }
                }
                picks.into_iter().map(Duration::seconds).collect()
            }
        };
        let needed = offsets.last().copied().unwrap_or_else(Duration::zero);
        let slack = (window_len - needed).num_seconds() - 1;
        let anchor = plan.window.start + Duration::seconds(rng.range_inclusive(0, slack.max(0)));

        let mut burst: Vec<Transaction> = offsets
            .into_iter()
            .map(|o| {
                let at = (anchor + o).min(plan.window.end - Duration::microseconds(1));
                let mut txn = self.baseline.baseline_transaction(entity, at, ids, rng);
                txn.set_direction(Direction::Debit);
                txn
            })
            .collect();

        match pattern {
            PatternKind::RapidSuccession => {
                for txn in &mut burst {
                    let cap = self.large_cap(&txn.currency);
                    txn.set_abs_amount((plan.threshold * rng.uniform(1.0, 1.5)).min(cap));
                    txn.description = "Outgoing transfer".to_string();
                }
            }
            _ => {
                let counterparty = burst.first().map(|t| t.counterparty.clone()).unwrap_or_default();
                for txn in &mut burst {
                    txn.counterparty = counterparty.clone();
                }
            }
        }
        burst
    }

    /// Existing transactions inside the window for a single-transaction
    /// pattern, topping up with fresh baseline ones when there are too few.
    #[allow(clippy::too_many_arguments)]
    fn pick_targets(
        &self,
        entity: &Entity,
        pattern: PatternKind,
        quota: u32,
        plan: &EntityPlan,
        transactions: &mut Vec<Transaction>,
        targets: &BTreeMap<usize, Vec<PatternKind>>,
        ids: &mut IdBlock,
        rng: &mut StreamRng,
    ) -> Vec<usize> {
        let usable = |i: usize, txns: &[Transaction]| {
            plan.window.contains(&txns[i].timestamp)
                && targets.get(&i).map_or(true, |ps| {
                    ps.iter().all(|p| !p.inserts_transactions() && !conflicts(*p, pattern))
                })
        };
        let mut pool: Vec<usize> = (0..transactions.len()).filter(|&i| usable(i, transactions.as_slice())).collect();
        while pool.len() < quota as usize {
            let at = plan.window.random_instant(rng);
            let txn = self.baseline.baseline_transaction(entity, at, ids, rng);
            pool.push(transactions.len());
            transactions.push(txn);
        }
        for i in 0..quota as usize {
            let j = i + rng.next_u64_below((pool.len() - i) as u64) as usize;
            pool.swap(i, j);
        }
        pool.truncate(quota as usize);
        pool
    }

    fn apply(
        &self,
        pattern: PatternKind,
        all: &[PatternKind],
        txn: &mut Transaction,
        plan: &EntityPlan,
        history: &mut HashSet<String>,
        rng: &mut StreamRng,
    ) {
        let cap = self.large_cap(&txn.currency);
        match pattern {
            PatternKind::LargeAmount => {
                let scaled = (txn.abs_amount() * rng.uniform(2.0, 5.0)).max(plan.threshold);
                txn.set_abs_amount(scaled.min(cap));
            }
            PatternKind::SuspiciousCounterparty => {
                txn.counterparty = rng.pick(&plan.suspicious).clone();
                txn.set_direction(Direction::Debit);
                txn.description = "International wire transfer".to_string();
            }
            PatternKind::RoundAmount => {
                let amount = txn.abs_amount();
                let raises_only = all.contains(&PatternKind::LargeAmount);
                let floor = if raises_only { amount } else { amount * 0.5 };
                let floor = floor.max(self.config.materiality_floor);
                let options: Vec<f64> = ROUND_FIGURES.iter().copied().filter(|f| *f >= floor).take(3).collect();
                let figure = if options.is_empty() {
                    (floor / 10_000.0).ceil() * 10_000.0
                } else {
                    *rng.pick(&options)
                };
                txn.set_abs_amount(figure);
            }
            PatternKind::OffHours => self.shift_off_hours(txn, plan, rng),
            PatternKind::NewBeneficiaryLarge => {
                let counterparty = loop {
                    let candidate = format!("NEW_BENEF_{:06}", rng.next_u64_below(1_000_000));
                    if !history.contains(&candidate) {
                        break candidate;
                    }
                };
                history.insert(counterparty.clone());
                txn.counterparty = counterparty;
                txn.set_direction(Direction::Debit);
                let scaled = (txn.abs_amount() * rng.uniform(3.0, 8.0)).max(plan.threshold * 0.5);
                txn.set_abs_amount(scaled.min(cap));
                txn.description = "Transfer to new beneficiary".to_string();
            }
            PatternKind::HighFrequency | PatternKind::RapidSuccession => {}
        }
    }

    /// Move into 23:00-05:59 on the same date, or onto the next weekend
    /// day when the weekend rule fires and the window allows it.
    fn shift_off_hours(&self, txn: &mut Transaction, plan: &EntityPlan, rng: &mut StreamRng) {
        let date = txn.timestamp.date();
        let random_time = |hour: u32, rng: &mut StreamRng| {
            NaiveTime::from_hms_micro_opt(
                hour,
                rng.range_inclusive(0, 59) as u32,
                rng.range_inclusive(0, 59) as u32,
                rng.range_inclusive(0, 999_999) as u32,
            )
            .unwrap_or(NaiveTime::MIN)
        };

        let hour = *rng.pick(&OFF_HOURS);
        let candidates = [
            date.and_time(random_time(hour, rng)),
            date.and_time(random_time(23, rng)),
            date.and_time(NaiveTime::MIN),
        ];
        let mut shifted = candidates
            .into_iter()
            .find(|ts| plan.window.contains(ts))
            .unwrap_or(txn.timestamp);

        if rng.chance(WEEKEND_RULE_PROBABILITY) {
            let weekend = next_weekend_day(date).and_time(shifted.time());
            if plan.window.contains(&weekend) {
                shifted = weekend;
            }
        }
        txn.timestamp = shifted;
        if txn.value_date < shifted.date() {
            txn.value_date = add_business_days(shifted.date(), 1);
        }
    }

    /// Labelled amounts strictly increase in timestamp order, compared in
    /// USD so a cluster spanning several currencies still escalates.
    fn escalate(&self, transactions: &mut [Transaction], targets: &BTreeMap<usize, Vec<PatternKind>>) {
        let mut order: Vec<usize> = targets.keys().copied().collect();
        order.sort_by(|&a, &b| {
            transactions[a]
                .timestamp
                .cmp(&transactions[b].timestamp)
                .then_with(|| transactions[a].transaction_id.cmp(&transactions[b].transaction_id))
        });

        let mut previous_usd = 0.0f64;
        for idx in order {
            let round = targets[&idx].contains(&PatternKind::RoundAmount);
            let txn = &mut transactions[idx];
            if txn.base_amount_usd.abs() <= previous_usd {
                let target_usd = (previous_usd * (1.0 + self.config.escalation_step)).max(previous_usd + 1.0);
                let mut local = target_usd * txn.fx_rate;
                if round {
                    local = (local / 1_000.0).ceil() * 1_000.0;
                }
                txn.set_abs_amount(local);
                // Cent rounding in the local currency can land back on the previous value.
                let bump = if round { 1_000.0 } else { txn.fx_rate.max(0.01) };
                while txn.base_amount_usd.abs() <= previous_usd {
                    txn.set_abs_amount(txn.abs_amount() + bump);
                }
            }
            previous_usd = txn.base_amount_usd.abs();
        }
    }
}

/// Two patterns that would both rewrite the counterparty.
fn conflicts(a: PatternKind, b: PatternKind) -> bool {
    use PatternKind::{NewBeneficiaryLarge, SuspiciousCounterparty};
    matches!(
        (a, b),
        (SuspiciousCounterparty, NewBeneficiaryLarge) | (NewBeneficiaryLarge, SuspiciousCounterparty)
    )
}
