use crate::{
    anomaly::PatternKind,
    error::{ConfigError, SynthResult},
    horizon::Horizon,
    types::EntityIndex,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Horizon ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HorizonConfig {
    pub start_date: NaiveDate,
    pub days: u32,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            days: 720,
        }
    }
}

// ── Entity registry ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Share of customers onboarded before the horizon starts.
    pub pre_horizon_onboarding_share: f64,
    pub pre_horizon_min_days: u32,
    pub pre_horizon_max_days: u32,
    /// Share of customers that may never close or churn.
    pub closure_ineligible_share: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pre_horizon_onboarding_share: 0.8,
            pre_horizon_min_days: 30,
            pre_horizon_max_days: 365 * 3,
            closure_ineligible_share: 0.1,
        }
    }
}

// ── Address update stream ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AddressConfig {
    /// Expected address changes per customer per year of lifetime.
    pub updates_per_year: f64,
    pub max_updates: u32,
    /// Probability that an update moves the customer to another country.
    pub cross_border_share: f64,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            updates_per_year: 0.25,
            max_updates: 4,
            cross_border_share: 0.1,
        }
    }
}

// ── Customer update stream ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdateConfig {
    /// Expected employment or tier updates per customer per year of lifetime.
    pub updates_per_year: f64,
    pub max_updates: u32,
    /// Share of updates that change employment. The rest change tier.
    pub employment_share: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            updates_per_year: 0.5,
            max_updates: 4,
            employment_share: 0.55,
        }
    }
}

// ── Baseline transactions ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransactionConfig {
    pub avg_per_month: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub currencies: Vec<String>,
    /// Probability that a customer has one silent spell in the horizon.
    pub quiet_spell_probability: f64,
    pub quiet_spell_min_days: u32,
    pub quiet_spell_max_days: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            avg_per_month: 3.5,
            min_amount: 10.0,
            max_amount: 50_000.0,
            currencies: ["USD", "EUR", "GBP", "JPY", "CAD"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            quiet_spell_probability: 0.15,
            quiet_spell_min_days: 200,
            quiet_spell_max_days: 420,
        }
    }
}

// ── Timeline scheduler ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RandomKindWeights {
    pub employment_change: f64,
    pub tier_upgrade: f64,
    pub closure: f64,
    pub reactivation: f64,
    pub churn: f64,
}

impl Default for RandomKindWeights {
    fn default() -> Self {
        Self {
            employment_change: 25.0,
            tier_upgrade: 20.0,
            closure: 15.0,
            reactivation: 15.0,
            churn: 10.0,
        }
    }
}

impl RandomKindWeights {
    pub fn as_slice(&self) -> [f64; 5] {
        [
            self.employment_change,
            self.tier_upgrade,
            self.closure,
            self.reactivation,
            self.churn,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    /// Days without activity before a customer counts as dormant.
    pub dormancy_threshold_days: u32,
    /// Weights for drawing 0, 1, 2 or 3 RANDOM events.
    pub random_event_count_weights: Vec<f64>,
    pub kind_weights: RandomKindWeights,
    pub offset_mean_days: f64,
    pub offset_sigma: f64,
    pub offset_floor_days: u32,
    pub offset_cap_days: u32,
    pub min_spacing_secs: u32,
    /// Kind redraws before an illegal slot is dropped.
    pub resample_attempts: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            dormancy_threshold_days: 180,
            random_event_count_weights: vec![30.0, 40.0, 25.0, 5.0],
            kind_weights: RandomKindWeights::default(),
            offset_mean_days: 180.0,
            offset_sigma: 0.5,
            offset_floor_days: 30,
            offset_cap_days: 900,
            min_spacing_secs: 1,
            resample_attempts: 4,
        }
    }
}

// ── Anomaly engine ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Fraction of entities that receive injected anomalies.
    pub rate: f64,
    /// Upper bound k on labelled transactions per flagged entity.
    pub max_per_entity: u32,
    /// Declared order doubles as the tie-break when patterns stack.
    pub catalog: Vec<PatternKind>,
    pub mixing_probability: f64,
    pub cluster_window_days: u32,
    pub escalation_step: f64,
    pub multiplier_min: f64,
    pub multiplier_max: f64,
    /// ROUND_AMOUNT only produces figures at or above this.
    pub materiality_floor: f64,
    /// Largest realistic single amount, expressed in USD.
    pub realistic_cap_usd: f64,
    /// Append `[PATTERN]` markers to descriptions for harness-side stripping.
    pub description_markers: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            rate: 0.02,
            max_per_entity: 6,
            catalog: PatternKind::ALL.to_vec(),
            mixing_probability: 0.3,
            cluster_window_days: 14,
            escalation_step: 0.15,
            multiplier_min: 5.0,
            multiplier_max: 20.0,
            materiality_floor: 1_000.0,
            realistic_cap_usd: 2_500_000.0,
            description_markers: false,
        }
    }
}

// ── Output ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Entities per customer_status batch file.
    pub status_batch_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("generated_data"),
            status_batch_size: 10_000,
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthConfig {
    pub seed: u64,
    pub population_size: usize,
    pub workers: usize,
    pub horizon: HorizonConfig,
    pub registry: RegistryConfig,
    pub addresses: AddressConfig,
    pub updates: UpdateConfig,
    pub transactions: TransactionConfig,
    pub timeline: TimelineConfig,
    pub anomaly: AnomalyConfig,
    pub output: OutputConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            population_size: 10,
            workers: 4,
            horizon: HorizonConfig::default(),
            registry: RegistryConfig::default(),
            addresses: AddressConfig::default(),
            updates: UpdateConfig::default(),
            transactions: TransactionConfig::default(),
            timeline: TimelineConfig::default(),
            anomaly: AnomalyConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl SynthConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// The result is validated before it is returned.
    pub fn load(path: &Path) -> SynthResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: SynthConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config with small hardcoded values for use in tests.
    pub fn default_test() -> Self {
        Self {
            seed: 7,
            population_size: 20,
            workers: 2,
            horizon: HorizonConfig {
                start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
                days: 365,
            },
            anomaly: AnomalyConfig {
                rate: 0.2,
                max_per_entity: 5,
                ..AnomalyConfig::default()
            },
            output: OutputConfig {
                dir: std::env::temp_dir().join("amlsynth-test"),
                status_batch_size: 8,
            },
            ..Self::default()
        }
    }

    pub fn horizon(&self) -> Horizon {
        Horizon::new(self.horizon.start_date, self.horizon.days)
    }

    /// The single gate run before any generation begins.
    /// Never clamps: every out-of-range value is an error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if EntityIndex::try_from(self.population_size).is_err() {
            return Err(ConfigError::PopulationTooLarge(self.population_size));
        }
        if self.horizon.days == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        let a = &self.anomaly;
        if !(0.0..=1.0).contains(&a.rate) || a.rate.is_nan() {
            return Err(ConfigError::AnomalyRateOutOfRange(a.rate));
        }
        if a.max_per_entity < 1 {
            return Err(ConfigError::MaxAnomaliesBelowOne(a.max_per_entity));
        }
        if a.catalog.is_empty() {
            return Err(ConfigError::EmptyPatternCatalog);
        }
        for (i, p) in a.catalog.iter().enumerate() {
            if a.catalog[..i].contains(p) {
                return Err(ConfigError::DuplicatePattern {
                    pattern: p.code().to_string(),
                });
            }
        }
        let smallest_need = a
            .catalog
            .iter()
            .map(|p| p.min_transactions())
            .min()
            .unwrap_or(1);
        if smallest_need > a.max_per_entity {
            return Err(ConfigError::CatalogUnsatisfiable(a.max_per_entity));
        }
        check_probability("anomaly.mixing_probability", a.mixing_probability)?;
        if a.cluster_window_days == 0 {
            return Err(ConfigError::OutOfRange {
                field: "anomaly.cluster_window_days",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
        check_non_negative("anomaly.escalation_step", a.escalation_step)?;
        check_min_max("anomaly.multiplier", a.multiplier_min, a.multiplier_max)?;
        if a.multiplier_min < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "anomaly.multiplier_min",
                value: a.multiplier_min,
                min: 1.0,
                max: a.multiplier_max,
            });
        }
        check_positive("anomaly.materiality_floor", a.materiality_floor)?;
        if a.realistic_cap_usd <= a.materiality_floor {
            return Err(ConfigError::InvertedRange {
                field: "anomaly.materiality_floor/realistic_cap_usd",
                min: a.materiality_floor,
                max: a.realistic_cap_usd,
            });
        }

        let r = &self.registry;
        check_probability("registry.pre_horizon_onboarding_share", r.pre_horizon_onboarding_share)?;
        check_probability("registry.closure_ineligible_share", r.closure_ineligible_share)?;
        check_min_max(
            "registry.pre_horizon_days",
            f64::from(r.pre_horizon_min_days),
            f64::from(r.pre_horizon_max_days),
        )?;

        let ad = &self.addresses;
        check_non_negative("addresses.updates_per_year", ad.updates_per_year)?;
        check_probability("addresses.cross_border_share", ad.cross_border_share)?;

        let u = &self.updates;
        check_non_negative("updates.updates_per_year", u.updates_per_year)?;
        check_probability("updates.employment_share", u.employment_share)?;

        let t = &self.transactions;
        check_non_negative("transactions.avg_per_month", t.avg_per_month)?;
        check_positive("transactions.min_amount", t.min_amount)?;
        check_min_max("transactions.amount", t.min_amount, t.max_amount)?;
        if t.currencies.is_empty() {
            return Err(ConfigError::EmptyList {
                field: "transactions.currencies",
            });
        }
        check_probability("transactions.quiet_spell_probability", t.quiet_spell_probability)?;
        check_min_max(
            "transactions.quiet_spell_days",
            f64::from(t.quiet_spell_min_days),
            f64::from(t.quiet_spell_max_days),
        )?;

        let tl = &self.timeline;
        if tl.dormancy_threshold_days == 0 {
            return Err(ConfigError::OutOfRange {
                field: "timeline.dormancy_threshold_days",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
        if tl.random_event_count_weights.len() != 4 {
            return Err(ConfigError::InvalidWeights {
                field: "timeline.random_event_count_weights",
            });
        }
        check_weights("timeline.random_event_count_weights", &tl.random_event_count_weights)?;
        check_weights("timeline.kind_weights", &tl.kind_weights.as_slice())?;
        check_positive("timeline.offset_mean_days", tl.offset_mean_days)?;
        check_non_negative("timeline.offset_sigma", tl.offset_sigma)?;
        check_min_max(
            "timeline.offset_days",
            f64::from(tl.offset_floor_days),
            f64::from(tl.offset_cap_days),
        )?;
        if tl.min_spacing_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "timeline.min_spacing_secs",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }

        if self.output.status_batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "output.status_batch_size",
                value: 0.0,
                min: 1.0,
                max: usize::MAX as f64,
            });
        }
        Ok(())
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min: 0.0, max: 1.0 })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min: 0.0, max: f64::MAX })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min: f64::MIN_POSITIVE, max: f64::MAX })
    }
}

fn check_min_max(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { field, min, max })
    }
}

fn check_weights(field: &'static str, weights: &[f64]) -> Result<(), ConfigError> {
    let valid = weights.iter().all(|w| *w >= 0.0 && w.is_finite())
        && weights.iter().sum::<f64>() > 0.0;
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeights { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(SynthConfig::default().validate(), Ok(()));
        assert_eq!(SynthConfig::default_test().validate(), Ok(()));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: SynthConfig =
            serde_json::from_str(r#"{ "seed": 9, "anomaly": { "rate": 0.5 } }"#).unwrap();
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.anomaly.rate, 0.5);
        assert_eq!(cfg.anomaly.max_per_entity, AnomalyConfig::default().max_per_entity);
        assert_eq!(cfg.timeline, TimelineConfig::default());
    }

    #[test]
    fn catalog_parses_from_codes() {
        let cfg: SynthConfig = serde_json::from_str(
            r#"{ "anomaly": { "catalog": ["ROUND_AMOUNT", "OFF_HOURS"] } }"#,
        )
        .unwrap();
        assert_eq!(cfg.anomaly.catalog, vec![PatternKind::RoundAmount, PatternKind::OffHours]);
    }
}
