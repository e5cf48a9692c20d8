//! Vehicle ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Violation counts at which the risk tier steps up
const MEDIUM_RISK_THRESHOLD: i64 = 3;
const HIGH_RISK_THRESHOLD: i64 = 6;
const CRITICAL_RISK_THRESHOLD: i64 = 11;

/// Coarse classification of a vehicle's violation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Tier from the violation count alone
    pub fn from_count(count: i64) -> Self {
        if count >= CRITICAL_RISK_THRESHOLD {
            RiskLevel::Critical
        } else if count >= HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if count >= MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Tier from count + blacklist flag; the blacklist forces CRITICAL
    pub fn derive(count: i64, blacklisted: bool) -> Self {
        if blacklisted {
            RiskLevel::Critical
        } else {
            Self::from_count(count)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CRITICAL" => RiskLevel::Critical,
            "HIGH" => RiskLevel::High,
            "MEDIUM" => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// Aggregate state for one license plate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate_number: String,
    /// Monotonically non-decreasing
    pub total_violations: i64,
    pub risk_level: RiskLevel,
    /// Operator-set, independent of the derived tier
    pub blacklisted: bool,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_tier_boundaries() {
        for count in [0, 1, 2] {
            assert_eq!(RiskLevel::from_count(count), RiskLevel::Low);
        }
        for count in [3, 4, 5] {
            assert_eq!(RiskLevel::from_count(count), RiskLevel::Medium);
        }
        for count in [6, 7, 8, 9, 10] {
            assert_eq!(RiskLevel::from_count(count), RiskLevel::High);
        }
        for count in [11, 12, 100] {
            assert_eq!(RiskLevel::from_count(count), RiskLevel::Critical);
        }
    }

    #[test]
    fn test_blacklist_forces_critical() {
        assert_eq!(RiskLevel::derive(0, true), RiskLevel::Critical);
        assert_eq!(RiskLevel::derive(1, true), RiskLevel::Critical);
        assert_eq!(RiskLevel::derive(1, false), RiskLevel::Low);
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        assert_eq!(RiskLevel::parse("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::parse("garbage"), RiskLevel::Low);
    }
}
