//! Violation record types

use crate::vehicle_ledger::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationStatus {
    Pending,
    Verified,
    Rejected,
    Dispatched,
}

impl ViolationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationStatus::Pending => "pending",
            ViolationStatus::Verified => "verified",
            ViolationStatus::Rejected => "rejected",
            ViolationStatus::Dispatched => "dispatched",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ViolationStatus::Pending),
            "verified" => Some(ViolationStatus::Verified),
            "rejected" => Some(ViolationStatus::Rejected),
            "dispatched" => Some(ViolationStatus::Dispatched),
            _ => None,
        }
    }

    /// Statuses an operator may transition a record into
    pub fn parse_transition(s: &str) -> Option<Self> {
        match Self::parse(s) {
            Some(ViolationStatus::Pending) | None => None,
            other => other,
        }
    }
}

/// Fine collection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Pending,
    Paid,
    Waived,
}

impl FineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineStatus::Pending => "pending",
            FineStatus::Paid => "paid",
            FineStatus::Waived => "waived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FineStatus::Pending),
            "paid" => Some(FineStatus::Paid),
            "waived" => Some(FineStatus::Waived),
            _ => None,
        }
    }
}

/// One detected infraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub violation_type: String,
    /// Absent when the plate was unreadable
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    /// 0-100
    pub confidence_score: f64,
    /// 0-100, default 0
    pub threat_score: f64,
    pub camera_id: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub evidence_url: Option<String>,
    pub video_timestamp_sec: Option<f64>,
    pub bounding_box: Option<serde_json::Value>,
    /// Set at most once, immediately after creation; never recomputed
    pub fine_amount: Option<i64>,
    pub fine_status: Option<FineStatus>,
    pub fine_generated_at: Option<DateTime<Utc>>,
    pub status: ViolationStatus,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Camera fields joined onto a violation for broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRef {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
}

/// Vehicle fields joined onto a violation for broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRef {
    pub plate_number: String,
    pub total_violations: i64,
    pub risk_level: RiskLevel,
    pub blacklisted: bool,
}

/// Violation joined with its camera and vehicle, the shape published on the
/// bus and returned to the ingesting service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedViolation {
    #[serde(flatten)]
    pub violation: Violation,
    pub camera: Option<CameraRef>,
    pub vehicle: Option<VehicleRef>,
}

/// Page of violations plus the unpaged total
#[derive(Debug, Clone, Serialize)]
pub struct ViolationPage {
    pub data: Vec<Violation>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ViolationStatus::Pending,
            ViolationStatus::Verified,
            ViolationStatus::Rejected,
            ViolationStatus::Dispatched,
        ] {
            assert_eq!(ViolationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ViolationStatus::parse("bogus"), None);
    }

    #[test]
    fn test_transition_excludes_pending() {
        assert_eq!(ViolationStatus::parse_transition("pending"), None);
        assert_eq!(
            ViolationStatus::parse_transition("verified"),
            Some(ViolationStatus::Verified)
        );
        assert_eq!(
            ViolationStatus::parse_transition("dispatched"),
            Some(ViolationStatus::Dispatched)
        );
    }

    #[test]
    fn test_fine_status_parse() {
        assert_eq!(FineStatus::parse("paid"), Some(FineStatus::Paid));
        assert_eq!(FineStatus::parse("PAID"), None);
    }
}
