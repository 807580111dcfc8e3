use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration. Always reported before generation starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("anomaly rate {0} is outside [0, 1]")]
    AnomalyRateOutOfRange(f64),

    #[error("max anomalous transactions per entity must be >= 1, got {0}")]
    MaxAnomaliesBelowOne(u32),

    #[error("anomaly pattern catalog is empty")]
    EmptyPatternCatalog,

    #[error("pattern {pattern} appears more than once in the catalog")]
    DuplicatePattern { pattern: String },

    #[error("catalog only holds multi-transaction patterns but max anomalies per entity is {0}")]
    CatalogUnsatisfiable(u32),

    #[error("population size must be > 0")]
    EmptyPopulation,

    #[error("population_size {0} exceeds the entity index range")]
    PopulationTooLarge(usize),

    #[error("horizon must span at least one day")]
    EmptyHorizon,

    #[error("worker count must be >= 1")]
    NoWorkers,

    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field}: minimum {min} exceeds maximum {max}")]
    InvertedRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{field}: weights must be non-negative with a positive sum")]
    InvalidWeights { field: &'static str },

    #[error("{field} must not be empty")]
    EmptyList { field: &'static str },
}

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Constraint violation for entity {entity_id}: {detail}")]
    ConstraintViolation { entity_id: String, detail: String },

    #[error("Write of {} failed; nothing was published: {source}", .artifact.display())]
    PartialWrite {
        artifact: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker pool failed: {0}")]
    WorkerPanicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SynthError {
    pub fn constraint(entity_id: &str, detail: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            entity_id: entity_id.to_string(),
            detail: detail.into(),
        }
    }
}

pub type SynthResult<T> = Result<T, SynthError>;
