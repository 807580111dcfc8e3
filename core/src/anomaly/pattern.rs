use serde::{Deserialize, Serialize};
use std::fmt;

/// Named anomaly templates, in their declared application order.
///
/// When several patterns land on the same transaction they are applied in
/// the order of this enum, whatever order the catalog lists them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    LargeAmount,
    HighFrequency,
    SuspiciousCounterparty,
    RoundAmount,
    OffHours,
    RapidSuccession,
    NewBeneficiaryLarge,
}

impl PatternKind {
    pub const ALL: [PatternKind; 7] = [
        Self::LargeAmount,
        Self::HighFrequency,
        Self::SuspiciousCounterparty,
        Self::RoundAmount,
        Self::OffHours,
        Self::RapidSuccession,
        Self::NewBeneficiaryLarge,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::LargeAmount => "LARGE_AMOUNT",
            Self::HighFrequency => "HIGH_FREQUENCY",
            Self::SuspiciousCounterparty => "SUSPICIOUS_COUNTERPARTY",
            Self::RoundAmount => "ROUND_AMOUNT",
            Self::OffHours => "OFF_HOURS",
            Self::RapidSuccession => "RAPID_SUCCESSION",
            Self::NewBeneficiaryLarge => "NEW_BENEFICIARY_LARGE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    /// How many labelled transactions one application of the pattern needs.
    pub fn min_transactions(&self) -> u32 {
        match self {
            Self::HighFrequency => 3,
            Self::RapidSuccession => 2,
            _ => 1,
        }
    }

    /// Multi-transaction patterns insert new transactions; the rest mutate
    /// existing ones.
    pub fn inserts_transactions(&self) -> bool {
        self.min_transactions() > 1
    }

    /// Free-text marker appended to descriptions when markers are enabled.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::LargeAmount => "[LARGE_TRANSFER]",
            Self::HighFrequency => "[HIGH_FREQUENCY]",
            Self::SuspiciousCounterparty => "[SUSPICIOUS_COUNTERPARTY]",
            Self::RoundAmount => "[ROUND_AMOUNT]",
            Self::OffHours => "[OFF_HOURS]",
            Self::RapidSuccession => "[RAPID_SUCCESSION]",
            Self::NewBeneficiaryLarge => "[NEW_LARGE_BENEFICIARY]",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_serde() {
        for p in PatternKind::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.code()));
            assert_eq!(PatternKind::from_code(p.code()), Some(p));
        }
    }

    #[test]
    fn declared_order_is_application_order() {
        let mut shuffled = vec![
            PatternKind::OffHours,
            PatternKind::LargeAmount,
            PatternKind::RoundAmount,
        ];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![PatternKind::LargeAmount, PatternKind::RoundAmount, PatternKind::OffHours]
        );
    }
}
