//! Serialization of a finished dataset into the on-disk layout.
//!
//! ```text
//! <out>/master_data/{customers,accounts,customer_addresses,customer_updates}.csv
//! <out>/customer_status/customer_status_batch_<nnnn>.csv
//! <out>/customer_events/customer_events_<date>.csv
//! <out>/pay_transactions/pay_transactions_<date>.csv
//! <out>/ground_truth/labels.db
//! ```
//!
//! RULE: Every file is published with write-temp-then-rename.
//! RULE: After a successful write, CSVs in the managed directories that this
//! run did not produce are removed. New files are in place before any old one
//! is deleted.

pub mod atomic;
pub mod rows;

pub use atomic::{publish, temp_path, write_bytes_atomic, write_csv_atomic};

use crate::{
    config::SynthConfig,
    engine::Dataset,
    error::{SynthError, SynthResult},
    partition::{partition_by, PartitionKey},
    store::LabelStore,
};
use rows::{AccountRow, AddressRow, CustomerRow, EventRow, StatusRow, TransactionRow, UpdateRow};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

pub const MASTER_DIR: &str = "master_data";
pub const STATUS_DIR: &str = "customer_status";
pub const EVENTS_DIR: &str = "customer_events";
pub const TRANSACTIONS_DIR: &str = "pay_transactions";
pub const GROUND_TRUTH_DIR: &str = "ground_truth";
pub const LABEL_DB: &str = "labels.db";

/// Write every artifact. Returns the published paths in write order.
pub fn write_dataset(dataset: &Dataset, config: &SynthConfig) -> SynthResult<Vec<PathBuf>> {
    let root = config.output.dir.as_path();
    let mut written = Vec::new();
    let mut emit = |path: PathBuf, result: SynthResult<()>| -> SynthResult<()> {
        result?;
        written.push(path);
        Ok(())
    };

    let entities = &dataset.entities;
    let master = root.join(MASTER_DIR);

    let customers: Vec<CustomerRow> = entities.iter().map(|r| CustomerRow::from(&r.entity)).collect();
    let path = master.join("customers.csv");
    emit(path.clone(), write_csv_atomic(&path, &customers))?;

    let accounts: Vec<AccountRow> = entities
        .iter()
        .flat_map(|r| r.entity.accounts.iter().map(AccountRow::from))
        .collect();
    let path = master.join("accounts.csv");
    emit(path.clone(), write_csv_atomic(&path, &accounts))?;

    let addresses: Vec<AddressRow> = entities
        .iter()
        .flat_map(|r| r.addresses.records().iter().map(AddressRow::from))
        .collect();
    let path = master.join("customer_addresses.csv");
    emit(path.clone(), write_csv_atomic(&path, &addresses))?;

    let updates: Vec<UpdateRow> = entities
        .iter()
        .flat_map(|r| r.updates.iter().map(UpdateRow::from))
        .collect();
    let path = master.join("customer_updates.csv");
    emit(path.clone(), write_csv_atomic(&path, &updates))?;

    let batch_size = config.output.status_batch_size;
    let statuses = entities
        .iter()
        .flat_map(|r| r.statuses.iter().map(move |s| (r.entity.index, StatusRow::from(s))));
    for (key, rows) in partition_by(statuses, |(index, _)| PartitionKey::entity_batch(*index, batch_size)) {
        let path = root.join(STATUS_DIR).join(format!("{}.csv", key.file_stem(STATUS_DIR)));
        let rows: Vec<StatusRow> = rows.into_iter().map(|(_, row)| row).collect();
        emit(path.clone(), write_csv_atomic(&path, &rows))?;
    }

    let events = entities
        .iter()
        .flat_map(|r| r.events.iter())
        .map(|e| (e.timestamp.date(), EventRow::from(e)));
    for (key, rows) in partition_by(events, |(date, _)| PartitionKey::Date(*date)) {
        let path = root.join(EVENTS_DIR).join(format!("{}.csv", key.file_stem(EVENTS_DIR)));
        let rows: Vec<EventRow> = rows.into_iter().map(|(_, row)| row).collect();
        emit(path.clone(), write_csv_atomic(&path, &rows))?;
    }

    let transactions = entities
        .iter()
        .flat_map(|r| r.transactions.iter())
        .map(|t| (t.timestamp.date(), TransactionRow::from(t)));
    for (key, rows) in partition_by(transactions, |(date, _)| PartitionKey::Date(*date)) {
        let path = root.join(TRANSACTIONS_DIR).join(format!("{}.csv", key.file_stem(TRANSACTIONS_DIR)));
        let rows: Vec<TransactionRow> = rows.into_iter().map(|(_, row)| row).collect();
        emit(path.clone(), write_csv_atomic(&path, &rows))?;
    }

    let path = root.join(GROUND_TRUTH_DIR).join(LABEL_DB);
    emit(path.clone(), write_label_store(&path, dataset, config))?;

    prune_stale(root, &written)?;
    Ok(written)
}

/// Remove CSVs under the managed directories that are not in `keep`.
/// Date and batch partitions from an earlier run would otherwise mix with
/// this one.
pub fn prune_stale(root: &Path, keep: &[PathBuf]) -> SynthResult<Vec<PathBuf>> {
    let keep: HashSet<&Path> = keep.iter().map(PathBuf::as_path).collect();
    let mut removed = Vec::new();
    for sub in [MASTER_DIR, STATUS_DIR, EVENTS_DIR, TRANSACTIONS_DIR] {
        let dir = root.join(sub);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let is_csv = path.extension().is_some_and(|x| x == "csv");
            if is_csv && path.is_file() && !keep.contains(path.as_path()) {
                std::fs::remove_file(&path)?;
                log::info!("removed stale artifact {}", path.display());
                removed.push(path);
            }
        }
    }
    Ok(removed)
}

/// Build the label database beside its final path, then rename it in.
pub fn write_label_store(path: &Path, dataset: &Dataset, config: &SynthConfig) -> SynthResult<()> {
    let tmp = temp_path(path);
    atomic::ensure_parent(path).map_err(|source| SynthError::PartialWrite {
        artifact: path.to_path_buf(),
        source,
    })?;
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }

    let built = (|| -> SynthResult<()> {
        let mut store = LabelStore::open(&tmp)?;
        store.migrate()?;
        store.insert_run(
            &dataset.run_id,
            config.seed,
            dataset.entities.len(),
            config.anomaly.rate,
            &serde_json::to_string(config)?,
        )?;
        let labels: Vec<_> = dataset.labels().cloned().collect();
        store.insert_labels(&labels)?;
        Ok(())
    })();

    match built {
        Ok(()) => publish(&tmp, path),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}
