//! synth-runner: headless runner for the AML synthetic data generator.
//!
//! Usage:
//!   synth-runner --seed 12345 --customers 1000 --days 720 --out generated_data
//!   synth-runner --config synth.json --anomaly-rate 0.05 --workers 8
//!   synth-runner --customers 50 --markers --summary-json

use amlsynth_core::{engine::SynthEngine, types::DATE_FORMAT, SynthConfig};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::env;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = build_config(&args)?;
    let summary_json = args.iter().any(|a| a == "--summary-json");

    if !summary_json {
        println!("AML synthetic data generator: synth-runner");
        println!("  seed:          {}", config.seed);
        println!("  customers:     {}", config.population_size);
        println!("  horizon:       {} + {} days", config.horizon.start_date, config.horizon.days);
        println!("  anomaly rate:  {}", config.anomaly.rate);
        println!("  max per cust:  {}", config.anomaly.max_per_entity);
        println!("  workers:       {}", config.workers);
        println!("  out:           {}", config.output.dir.display());
        println!();
    }

    let engine = SynthEngine::new(config)?;
    let summary = engine.run()?;
    log::info!("run={} complete: {} labels", summary.run_id, summary.labels);

    if summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("=== RUN SUMMARY ===");
    println!("  run_id:           {}", summary.run_id);
    println!("  customers:        {}", summary.entities);
    println!("  flagged:          {}", summary.flagged_entities);
    println!("  labels:           {}", summary.labels);
    println!("  transactions:     {}", summary.transactions);
    println!("  status rows:      {}", summary.status_rows);
    println!("  address rows:     {}", summary.address_rows);
    println!("  update rows:      {}", summary.update_rows);
    println!("  dormancy windows: {}", summary.dormancy_windows);
    println!("  random events:    {}", summary.random_events);
    println!("  files written:    {}", summary.files_written.len());
    println!();
    println!("=== EVENTS BY KIND ===");
    for (kind, count) in &summary.events_by_kind {
        println!("  {kind:<18} {count}");
    }
    Ok(())
}

/// Config file (if any) first, then command-line flags on top.
/// Validation happens in SynthEngine::new.
fn build_config(args: &[String]) -> Result<SynthConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => load_unvalidated(Path::new(path))?,
        None => SynthConfig::default(),
    };

    if let Some(seed) = parse_opt::<u64>(args, "--seed")? {
        config.seed = seed;
    }
    if let Some(n) = parse_opt::<usize>(args, "--customers")? {
        config.population_size = n;
    }
    if let Some(rate) = parse_opt::<f64>(args, "--anomaly-rate")? {
        config.anomaly.rate = rate;
    }
    if let Some(k) = parse_opt::<u32>(args, "--max-anomalies")? {
        config.anomaly.max_per_entity = k;
    }
    if let Some(days) = parse_opt::<u32>(args, "--days")? {
        config.horizon.days = days;
    }
    if let Some(workers) = parse_opt::<usize>(args, "--workers")? {
        config.workers = workers;
    }
    if let Some(start) = flag_value(args, "--start-date") {
        config.horizon.start_date = NaiveDate::parse_from_str(start, DATE_FORMAT)
            .with_context(|| format!("--start-date {start} is not YYYY-MM-DD"))?;
    }
    if let Some(out) = flag_value(args, "--out") {
        config.output.dir = PathBuf::from(out);
    }
    if args.iter().any(|a| a == "--markers") {
        config.anomaly.description_markers = true;
    }
    Ok(config)
}

/// The file may be completed by flags, so it is validated only once the
/// overlay is applied.
fn load_unvalidated(path: &Path) -> Result<SynthConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Cannot parse {}", path.display()))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_opt<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match flag_value(args, flag) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{flag}: cannot parse {raw:?}")),
        None => Ok(None),
    }
}
