//! The generation engine.
//!
//! PER-ENTITY ORDER (fixed, never reordered):
//!   1. Address update stream      (source of truth for ADDRESS_CHANGE)
//!   2. Baseline transactions
//!   3. Anomaly injection          (flagged entities only)
//!   4. Dormancy windows           (from the final transaction stream)
//!   5. Customer update stream     (source of truth for sourced EMPLOYMENT_CHANGE / TIER_UPGRADE)
//!   6. Consistency linker         (both streams become DATA_DRIVEN events)
//!   7. Event scheduler            (onboarding + DATA_DRIVEN + RANDOM)
//!   8. Status projector           (SCD2 status history)
//!   9. Invariant checks           (any failure aborts the run)
//!
//! RULES:
//!   - An entity depends only on its own streams and the configuration.
//!   - Workers share nothing mutable except the work-queue cursor.
//!   - Nothing is written until every entity has been built and checked.

use crate::{
    address::AddressHistory,
    anomaly::{select_entities, AnomalyInjector, AnomalyLabel},
    config::SynthConfig,
    error::{SynthError, SynthResult},
    horizon::Horizon,
    ids::IdBlock,
    linker,
    output,
    registry::{Entity, EntityRegistry},
    rng::{RngBank, StreamSlot},
    status::{self, StatusInterval},
    timeline::{replay, DormancyWindow, EventKind, EventScheduler, LifecycleEvent},
    transactions::{dormancy_windows, Transaction, TransactionGenerator},
    types::{EntityIndex, RunId, Timestamp},
    updates::{self, CustomerUpdate},
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
};
use uuid::Builder;

/// Everything generated for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecords {
    pub entity: Entity,
    pub addresses: AddressHistory,
    pub updates: Vec<CustomerUpdate>,
    pub dormancy: Vec<DormancyWindow>,
    pub events: Vec<LifecycleEvent>,
    pub statuses: Vec<StatusInterval>,
    pub transactions: Vec<Transaction>,
    pub labels: Vec<AnomalyLabel>,
    pub flagged: bool,
}

/// A finished, checked run held in memory, in entity order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub run_id: RunId,
    pub horizon: Horizon,
    pub entities: Vec<EntityRecords>,
}

impl Dataset {
    pub fn labels(&self) -> impl Iterator<Item = &AnomalyLabel> {
        self.entities.iter().flat_map(|e| e.labels.iter())
    }

    pub fn flagged_entity_ids(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| !e.labels.is_empty())
            .map(|e| e.entity.entity_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub seed: u64,
    pub entities: usize,
    pub flagged_entities: usize,
    pub events_by_kind: BTreeMap<String, usize>,
    pub random_events: usize,
    pub status_rows: usize,
    pub address_rows: usize,
    pub update_rows: usize,
    pub dormancy_windows: usize,
    pub transactions: usize,
    pub labels: usize,
    pub files_written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn from_dataset(dataset: &Dataset, seed: u64, files_written: Vec<PathBuf>) -> Self {
        let mut events_by_kind = BTreeMap::new();
        for e in dataset.entities.iter().flat_map(|r| r.events.iter()) {
            *events_by_kind.entry(e.kind.code().to_string()).or_insert(0) += 1;
        }
        let sum = |f: fn(&EntityRecords) -> usize| dataset.entities.iter().map(f).sum::<usize>();
        Self {
            run_id: dataset.run_id.clone(),
            seed,
            entities: dataset.entities.len(),
            flagged_entities: dataset.flagged_entity_ids().len(),
            events_by_kind,
            random_events: sum(|r| r.events.iter().filter(|e| e.is_random()).count()),
            status_rows: sum(|r| r.statuses.len()),
            address_rows: sum(|r| r.addresses.records().len()),
            update_rows: sum(|r| r.updates.len()),
            dormancy_windows: sum(|r| r.dormancy.len()),
            transactions: sum(|r| r.transactions.len()),
            labels: sum(|r| r.labels.len()),
            files_written,
        }
    }
}

pub struct SynthEngine {
    config: SynthConfig,
    bank: RngBank,
    run_id: RunId,
}

impl SynthEngine {
    /// Validate the configuration and derive the run identity.
    /// Fails before anything is generated or written.
    pub fn new(config: SynthConfig) -> SynthResult<Self> {
        config.validate()?;
        let bank = RngBank::new(config.seed);
        let run_id = Builder::from_random_bytes(bank.for_run(StreamSlot::RunIdentity).next_bytes16())
            .into_uuid()
            .to_string();
        Ok(Self { config, bank, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Generate and write the full output set.
    pub fn run(&self) -> SynthResult<RunSummary> {
        let dataset = self.generate()?;
        let files = output::write_dataset(&dataset, &self.config)?;
        log::info!(
            "run={} wrote {} files to {}",
            self.run_id,
            files.len(),
            self.config.output.dir.display()
        );
        Ok(RunSummary::from_dataset(&dataset, self.config.seed, files))
    }

    /// Generate the seeded population in memory.
    pub fn generate(&self) -> SynthResult<Dataset> {
        let registry = EntityRegistry::seed(&self.config, &self.bank);
        log::info!("run={} phase=registry entities={}", self.run_id, registry.len());
        self.generate_for(&registry)
    }

    /// Generate for a caller-supplied registry. Entity indices must be
    /// 0..len in order.
    pub fn generate_for(&self, registry: &EntityRegistry) -> SynthResult<Dataset> {
        for (i, e) in registry.entities().iter().enumerate() {
            if e.index as usize != i {
                return Err(SynthError::constraint(&e.entity_id, format!("registry slot {i} holds index {}", e.index)));
            }
        }

        let flagged: HashSet<EntityIndex> = select_entities(
            self.config.anomaly.rate,
            registry.len(),
            &mut self.bank.for_run(StreamSlot::Selection),
        )
        .into_iter()
        .collect();
        log::info!("run={} phase=selection flagged={}", self.run_id, flagged.len());

        let entities = self.build_all(registry, &flagged)?;
        log::info!("run={} phase=generation entities={}", self.run_id, entities.len());
        Ok(Dataset {
            run_id: self.run_id.clone(),
            horizon: self.config.horizon(),
            entities,
        })
    }

    /// Bounded worker pool over the entity list. Results come back in
    /// entity order whatever order the workers finished in.
    fn build_all(
        &self,
        registry: &EntityRegistry,
        flagged: &HashSet<EntityIndex>,
    ) -> SynthResult<Vec<EntityRecords>> {
        let entities = registry.entities();
        let cursor = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let workers = self.config.workers.min(entities.len()).max(1);

        let outcomes: Vec<thread::Result<SynthResult<Vec<(usize, EntityRecords)>>>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let (cursor, abort) = (&cursor, &abort);
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        while !abort.load(Ordering::Relaxed) {
                            let i = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(entity) = entities.get(i) else {
                                break;
                            };
                            match self.build_entity(entity, flagged.contains(&entity.index)) {
                                Ok(records) => done.push((i, records)),
                                Err(e) => {
                                    log::warn!("worker={worker} entity={} failed: {e}", entity.entity_id);
                                    abort.store(true, Ordering::Relaxed);
                                    return Err(e);
                                }
                            }
                        }
                        log::debug!("worker={worker} built {} entities", done.len());
                        Ok(done)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut built = Vec::with_capacity(entities.len());
        for outcome in outcomes {
            match outcome {
                Ok(Ok(part)) => built.extend(part),
                Ok(Err(e)) => return Err(e),
                Err(payload) => return Err(SynthError::WorkerPanicked(panic_message(payload))),
            }
        }
        built.sort_by_key(|(i, _)| *i);
        Ok(built.into_iter().map(|(_, r)| r).collect())
    }

    /// Build and check one entity. Pure in (seed, entity, configuration).
    pub fn build_entity(&self, entity: &Entity, flagged: bool) -> SynthResult<EntityRecords> {
        let cfg = &self.config;
        let horizon = cfg.horizon();
        let index = entity.index;
        let mut ids = IdBlock::for_entity(index);

        let addresses = AddressHistory::generate(
            entity,
            &horizon,
            &cfg.addresses,
            &mut ids,
            &mut self.bank.for_entity(index, StreamSlot::Address),
        )?;

        let mut transactions = TransactionGenerator::new(&cfg.transactions, horizon).generate(
            entity,
            &mut ids,
            &mut self.bank.for_entity(index, StreamSlot::Transaction),
        );

        let labels = if flagged {
            AnomalyInjector::new(&cfg.anomaly, &cfg.transactions, horizon).inject(
                entity,
                &self.run_id,
                &mut transactions,
                &mut ids,
                &mut self.bank.for_entity(index, StreamSlot::Anomaly),
            )?
        } else {
            Vec::new()
        };

        // Injection may move or add activity, so windows come from the final stream.
        let dormancy = dormancy_windows(entity, &transactions, &horizon, cfg.timeline.dormancy_threshold_days);

        let address_instants: Vec<Timestamp> = addresses.records().iter().map(|r| r.effective_from).collect();
        let mut customer_updates = updates::generate(
            entity,
            &horizon,
            &cfg.updates,
            &dormancy,
            &address_instants,
            &mut ids,
            &mut self.bank.for_entity(index, StreamSlot::Update),
        );

        let mut data_driven = linker::address_change_events(&addresses);
        data_driven.extend(linker::customer_update_events(&customer_updates));
        let events = EventScheduler::new(&cfg.timeline, horizon).schedule(
            entity,
            data_driven,
            &dormancy,
            &mut ids,
            &mut self.bank.for_entity(index, StreamSlot::Timeline),
        )?;
        linker::settle_update_values(&mut customer_updates, &events);

        let statuses = status::project(&entity.entity_id, &events, &mut ids)?;

        let records = EntityRecords {
            entity: entity.clone(),
            addresses,
            updates: customer_updates,
            dormancy,
            events,
            statuses,
            transactions,
            labels,
            flagged,
        };
        verify_entity(&records, &horizon, cfg.anomaly.max_per_entity)?;
        log::debug!(
            "entity={} events={} statuses={} txns={} labels={}",
            entity.entity_id,
            records.events.len(),
            records.statuses.len(),
            records.transactions.len(),
            records.labels.len()
        );
        Ok(records)
    }
}

/// Every cross-artifact invariant for one entity. Any failure is a
/// generator defect and aborts the run.
pub fn verify_entity(records: &EntityRecords, horizon: &Horizon, max_labels: u32) -> SynthResult<()> {
    let entity = &records.entity;
    let id = entity.entity_id.as_str();

    records.addresses.validate()?;
    updates::validate(entity, &records.updates, &records.dormancy)?;
    status::validate_contiguity(id, &records.statuses)?;
    linker::verify_address_agreement(id, &records.events, &records.addresses)?;
    linker::verify_update_agreement(id, &records.events, &records.updates)?;
    replay(id, &records.events, entity.closure_eligible, &records.dormancy)?;

    match records.events.first() {
        Some(e) if e.kind == EventKind::Onboarding && e.timestamp == entity.onboarded_at => {}
        _ => return Err(SynthError::constraint(id, "first event is not ONBOARDING at the onboarding instant")),
    }
    if let Some(e) = records.events.iter().find(|e| e.timestamp >= horizon.end) {
        return Err(SynthError::constraint(id, format!("event {} is past the horizon", e.event_id)));
    }
    let active_from = entity.active_from(horizon);
    if let Some(e) = records.events.iter().find(|e| e.is_random() && e.timestamp < active_from) {
        return Err(SynthError::constraint(id, format!("RANDOM event {} precedes the horizon", e.event_id)));
    }

    if let Some(t) = records
        .transactions
        .iter()
        .find(|t| t.timestamp < entity.onboarded_at || t.timestamp >= horizon.end)
    {
        return Err(SynthError::constraint(id, format!("transaction {} is outside the lifetime", t.transaction_id)));
    }
    if let Some(t) = records
        .transactions
        .iter()
        .find(|t| records.dormancy.iter().any(|w| w.contains(&t.timestamp)))
    {
        return Err(SynthError::constraint(id, format!("transaction {} falls in a dormancy window", t.transaction_id)));
    }

    let n = records.labels.len();
    if records.flagged && (n == 0 || n > max_labels as usize) {
        return Err(SynthError::constraint(id, format!("flagged entity carries {n} labels")));
    }
    if !records.flagged && n > 0 {
        return Err(SynthError::constraint(id, "unflagged entity carries labels"));
    }
    let txn_ids: HashSet<&str> = records.transactions.iter().map(|t| t.transaction_id.as_str()).collect();
    if let Some(l) = records.labels.iter().find(|l| !txn_ids.contains(l.transaction_id.as_str())) {
        return Err(SynthError::constraint(id, format!("label {} points at no transaction", l.label_id)));
    }
    Ok(())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
