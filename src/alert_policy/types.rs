//! Alert types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator-facing severity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Medium => "MEDIUM",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CRITICAL" => AlertSeverity::Critical,
            "HIGH" => AlertSeverity::High,
            _ => AlertSeverity::Medium,
        }
    }
}

/// Alert lifecycle status; transitions run strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(AlertStatus::Active),
            "ACKNOWLEDGED" => Some(AlertStatus::Acknowledged),
            "RESOLVED" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }

    /// Lifecycle position, for the forward-only transition guard
    pub fn rank(&self) -> u8 {
        match self {
            AlertStatus::Active => 0,
            AlertStatus::Acknowledged => 1,
            AlertStatus::Resolved => 2,
        }
    }
}

/// An operator-facing notification derived from a violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub violation_id: String,
    pub camera_id: String,
    pub plate_number: Option<String>,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(AlertStatus::parse("ACTIVE"), Some(AlertStatus::Active));
        assert_eq!(
            AlertStatus::parse("ACKNOWLEDGED"),
            Some(AlertStatus::Acknowledged)
        );
        assert_eq!(AlertStatus::parse("RESOLVED"), Some(AlertStatus::Resolved));
        assert_eq!(AlertStatus::parse("active"), None);
    }

    #[test]
    fn test_status_ranks_are_ordered() {
        assert!(AlertStatus::Active.rank() < AlertStatus::Acknowledged.rank());
        assert!(AlertStatus::Acknowledged.rank() < AlertStatus::Resolved.rank());
    }
}
