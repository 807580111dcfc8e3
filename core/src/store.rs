//! SQLite ground-truth label store.
//!
//! RULE: Only store.rs talks to the database.
//! Labels go here and nowhere near the observed transaction files.

use crate::{
    anomaly::{AnomalyLabel, PatternKind},
    error::{SynthError, SynthResult},
    types::{format_ts, TIMESTAMP_FORMAT},
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::path::Path;

pub struct LabelStore {
    conn: Connection,
}

impl LabelStore {
    /// Open (or create) the label database at `path`.
    pub fn open(path: &Path) -> SynthResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SynthResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SynthResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_ground_truth.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        seed: u64,
        population_size: usize,
        anomaly_rate: f64,
        config_json: &str,
    ) -> SynthResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, population_size, anomaly_rate, config_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                seed as i64,
                env!("CARGO_PKG_VERSION"),
                population_size as i64,
                anomaly_rate,
                config_json,
            ],
        )?;
        Ok(())
    }

    // ── Labels ─────────────────────────────────────────────────

    /// Insert a batch of labels in one transaction.
    pub fn insert_labels(&mut self, labels: &[AnomalyLabel]) -> SynthResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO anomaly_label
                 (label_id, run_id, transaction_id, entity_id, patterns, intensity,
                  injected_at, cluster_start, cluster_end)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for l in labels {
                stmt.execute(params![
                    l.label_id,
                    l.run_id,
                    l.transaction_id,
                    l.entity_id,
                    l.pattern_codes(),
                    l.intensity,
                    format_ts(&l.injected_at),
                    format_ts(&l.cluster_start),
                    format_ts(&l.cluster_end),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn labels_for_run(&self, run_id: &str) -> SynthResult<Vec<AnomalyLabel>> {
        let mut stmt = self.conn.prepare(
            "SELECT label_id, run_id, transaction_id, entity_id, patterns, intensity,
                    injected_at, cluster_start, cluster_end
             FROM anomaly_label WHERE run_id = ?1
             ORDER BY entity_id ASC, injected_at ASC, transaction_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;
        let raw = rows.collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(label_id, run_id, transaction_id, entity_id, patterns, intensity, at, from, to)| {
                Ok(AnomalyLabel {
                    patterns: parse_patterns(&patterns)?,
                    label_id,
                    run_id,
                    transaction_id,
                    entity_id,
                    intensity,
                    injected_at: parse_ts(&at)?,
                    cluster_start: parse_ts(&from)?,
                    cluster_end: parse_ts(&to)?,
                })
            })
            .collect()
    }

    /// Entities carrying at least one label, sorted.
    pub fn flagged_entities(&self, run_id: &str) -> SynthResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT entity_id FROM anomaly_label WHERE run_id = ?1 ORDER BY entity_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn label_count(&self, run_id: &str) -> SynthResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM anomaly_label WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn parse_ts(s: &str) -> SynthResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| anyhow::anyhow!("bad timestamp {s} in label store: {e}").into())
}

fn parse_patterns(s: &str) -> SynthResult<Vec<PatternKind>> {
    s.split('|')
        .map(|code| {
            PatternKind::from_code(code)
                .ok_or_else(|| SynthError::from(anyhow::anyhow!("unknown pattern {code} in label store")))
        })
        .collect()
}
