use crate::types::{EntityId, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Onboarding,
    AddressChange,
    EmploymentChange,
    TierUpgrade,
    Closure,
    Reactivation,
    Churn,
}

impl EventKind {
    /// Kinds the scheduler may sample, in the order of the kind weights.
    pub const RANDOM: [EventKind; 5] = [
        Self::EmploymentChange,
        Self::TierUpgrade,
        Self::Closure,
        Self::Reactivation,
        Self::Churn,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Onboarding => "ONBOARDING",
            Self::AddressChange => "ADDRESS_CHANGE",
            Self::EmploymentChange => "EMPLOYMENT_CHANGE",
            Self::TierUpgrade => "TIER_UPGRADE",
            Self::Closure => "CLOSURE",
            Self::Reactivation => "REACTIVATION",
            Self::Churn => "CHURN",
        }
    }

    pub fn ends_relationship(&self) -> bool {
        matches!(self, Self::Closure | Self::Churn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Timestamp supplied by a source-of-truth generator. Never resampled.
    DataDriven,
    Random,
}

impl Provenance {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataDriven => "DATA_DRIVEN",
            Self::Random => "RANDOM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Online,
    Branch,
    Mobile,
    Phone,
    System,
}

impl Channel {
    pub const ALL: [Channel; 5] = [Self::Online, Self::Branch, Self::Mobile, Self::Phone, Self::System];
    pub const WEIGHTS: [f64; 5] = [35.0, 25.0, 30.0, 5.0, 5.0];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Branch => "BRANCH",
            Self::Mobile => "MOBILE",
            Self::Phone => "PHONE",
            Self::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    NotRequired,
    Pending,
    Approved,
}

impl ReviewStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotRequired => "NOT_REQUIRED",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
        }
    }
}

/// Old/new value pair plus free-form structured detail.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub details: serde_json::Value,
}

/// One lifecycle occurrence on an entity's timeline.
///
/// Events are append-only once the scheduler has ordered them. `event_id`,
/// `channel` and the payload of RANDOM events are filled in by the scheduler
/// after ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: String,
    pub entity_id: EntityId,
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub provenance: Provenance,
    pub payload: EventPayload,
    pub channel: Channel,
    pub triggered_by: String,
    pub requires_review: bool,
    pub review_status: ReviewStatus,
    pub review_date: Option<NaiveDate>,
    pub notes: String,
    /// Identifier of the source-of-truth record a DATA_DRIVEN event mirrors.
    pub source_ref: Option<String>,
}

impl LifecycleEvent {
    pub fn new(entity_id: &str, kind: EventKind, timestamp: Timestamp, provenance: Provenance) -> Self {
        Self {
            event_id: String::new(),
            entity_id: entity_id.to_string(),
            kind,
            timestamp,
            provenance,
            payload: EventPayload::default(),
            channel: Channel::System,
            triggered_by: String::new(),
            requires_review: false,
            review_status: ReviewStatus::NotRequired,
            review_date: None,
            notes: String::new(),
            source_ref: None,
        }
    }

    pub fn is_random(&self) -> bool {
        self.provenance == Provenance::Random
    }
}
