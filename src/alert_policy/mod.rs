//! Alert Policy Engine
//!
//! ## Responsibilities
//!
//! - Decide whether a newly created violation warrants an operator alert
//! - Persist the alert and publish it on the fan-out bus
//! - Operator alert lifecycle (acknowledge/resolve, forward-only)
//!
//! Alert creation failure never rolls back the already-persisted violation;
//! it is logged and the pipeline continues in degraded mode.

mod memory;
mod repository;
mod types;

pub use memory::MemoryAlertStore;
pub use repository::{AlertStore, MySqlAlertStore};
pub use types::{Alert, AlertSeverity, AlertStatus};

use crate::error::{Error, Result};
use crate::event_bus::{EventSink, Topic};
use crate::vehicle_ledger::{RiskLevel, Vehicle};
use crate::violations::Violation;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Confidence score at which rule 2 fires
const HIGH_CONFIDENCE_THRESHOLD: f64 = 95.0;
/// Violation count at which rule 3 fires
const REPEAT_COUNT_THRESHOLD: i64 = 5;
/// Violation kinds that are CRITICAL on their own
const CRITICAL_KINDS: [&str; 1] = ["WRONG_WAY"];

/// Priority-ordered, first-match severity decision. Evaluated in this exact
/// order; the first matching rule wins.
pub fn decide_severity(violation: &Violation, vehicle: Option<&Vehicle>) -> Option<AlertSeverity> {
    let blacklisted = vehicle.map_or(false, |v| v.blacklisted);
    let risk = vehicle.map(|v| v.risk_level);
    let count = vehicle.map_or(0, |v| v.total_violations);

    // 1. Most severe kind, blacklisted vehicle, or CRITICAL risk tier
    if CRITICAL_KINDS.contains(&violation.violation_type.as_str())
        || blacklisted
        || risk == Some(RiskLevel::Critical)
    {
        return Some(AlertSeverity::Critical);
    }

    // 2. High-confidence detection on an elevated-risk vehicle
    if violation.confidence_score >= HIGH_CONFIDENCE_THRESHOLD
        && matches!(risk, Some(RiskLevel::High) | Some(RiskLevel::Medium))
    {
        return Some(AlertSeverity::High);
    }

    // 3. Accumulated history
    if count >= REPEAT_COUNT_THRESHOLD {
        return Some(AlertSeverity::Medium);
    }

    None
}

/// Evaluates violations against the alert rules, persisting and publishing on
/// a match. Receives the bus as an injected capability.
pub struct AlertPolicyEngine {
    store: Arc<dyn AlertStore>,
    bus: Arc<dyn EventSink>,
}

impl AlertPolicyEngine {
    pub fn new(store: Arc<dyn AlertStore>, bus: Arc<dyn EventSink>) -> Self {
        Self { store, bus }
    }

    /// Called once per newly-created violation, after the ledger update and
    /// fine computation. Returns the created alert, or None when no rule
    /// matched or alert persistence failed (degraded mode, not an error).
    pub async fn evaluate(
        &self,
        violation: &Violation,
        vehicle: Option<&Vehicle>,
    ) -> Option<Alert> {
        let severity = decide_severity(violation, vehicle)?;

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            violation_id: violation.id.clone(),
            camera_id: violation.camera_id.clone(),
            plate_number: violation.plate_number.clone(),
            severity,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        };

        if let Err(e) = self.store.create(&alert).await {
            tracing::error!(
                violation_id = %violation.id,
                severity = %severity.as_str(),
                error = %e,
                "Alert persistence failed, continuing degraded"
            );
            return None;
        }

        tracing::info!(
            alert_id = %alert.id,
            violation_id = %violation.id,
            severity = %severity.as_str(),
            "Alert created"
        );

        match serde_json::to_value(&alert) {
            Ok(payload) => self.bus.publish_lossy(Topic::AlertNew, &payload).await,
            Err(e) => tracing::error!(error = %e, "Failed to serialize alert"),
        }

        Some(alert)
    }

    /// Operator acknowledge/resolve. Transitions run strictly forward:
    /// ACTIVE -> ACKNOWLEDGED -> RESOLVED, never backward.
    pub async fn update_status(&self, alert_id: &str, status: AlertStatus) -> Result<Alert> {
        let current = self
            .store
            .find(alert_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Alert {} not found", alert_id)))?;

        if status.rank() <= current.status.rank() {
            return Err(Error::Validation(format!(
                "Cannot transition alert from {} to {}",
                current.status.as_str(),
                status.as_str()
            )));
        }

        let alert = self
            .store
            .update_status(alert_id, status, Utc::now())
            .await?
            .ok_or_else(|| Error::NotFound(format!("Alert {} not found", alert_id)))?;

        let payload = serde_json::json!({
            "id": alert.id,
            "status": alert.status,
            "plate_number": alert.plate_number,
        });
        self.bus
            .publish_lossy(Topic::AlertStatusChange, &payload)
            .await;

        Ok(alert)
    }

    /// ACTIVE + ACKNOWLEDGED alerts for the dashboard
    pub async fn list_open(&self) -> Result<Vec<Alert>> {
        self.store.list_open().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::MemorySink;
    use crate::violations::ViolationStatus;

    fn violation(kind: &str, confidence: f64) -> Violation {
        Violation {
            id: "v-1".to_string(),
            violation_type: kind.to_string(),
            plate_number: Some("DL01AB1234".to_string()),
            vehicle_type: None,
            confidence_score: confidence,
            threat_score: 0.0,
            camera_id: "cam-1".to_string(),
            location_lat: None,
            location_lng: None,
            evidence_url: None,
            video_timestamp_sec: None,
            bounding_box: None,
            fine_amount: None,
            fine_status: None,
            fine_generated_at: None,
            status: ViolationStatus::Pending,
            verified_by: None,
            verified_at: None,
            created_at: Utc::now(),
        }
    }

    fn vehicle(count: i64, blacklisted: bool) -> Vehicle {
        Vehicle {
            plate_number: "DL01AB1234".to_string(),
            total_violations: count,
            risk_level: RiskLevel::derive(count, blacklisted),
            blacklisted,
            last_violation_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_wrong_way_is_critical_regardless_of_history() {
        // Rule 1 short-circuits before rules 2/3
        let v = violation("WRONG_WAY", 99.0);
        let low_risk = vehicle(1, false);
        assert_eq!(
            decide_severity(&v, Some(&low_risk)),
            Some(AlertSeverity::Critical)
        );
        assert_eq!(decide_severity(&v, None), Some(AlertSeverity::Critical));
    }

    #[test]
    fn test_blacklist_is_critical() {
        let v = violation("NO_HELMET", 50.0);
        assert_eq!(
            decide_severity(&v, Some(&vehicle(1, true))),
            Some(AlertSeverity::Critical)
        );
    }

    #[test]
    fn test_critical_risk_tier_is_critical() {
        let v = violation("NO_HELMET", 50.0);
        assert_eq!(
            decide_severity(&v, Some(&vehicle(11, false))),
            Some(AlertSeverity::Critical)
        );
    }

    #[test]
    fn test_high_confidence_elevated_risk_is_high() {
        let v = violation("RED_LIGHT", 96.0);
        assert_eq!(
            decide_severity(&v, Some(&vehicle(6, false))),
            Some(AlertSeverity::High)
        );
        assert_eq!(
            decide_severity(&v, Some(&vehicle(3, false))),
            Some(AlertSeverity::High)
        );
    }

    #[test]
    fn test_confidence_below_threshold_falls_through_to_rule_3() {
        // Confidence 94 on a HIGH-risk vehicle: rule 2 misses, rule 3 catches
        // it because the count is over 5
        let v = violation("RED_LIGHT", 94.0);
        assert_eq!(
            decide_severity(&v, Some(&vehicle(6, false))),
            Some(AlertSeverity::Medium)
        );
        // Count 4: no rule matches
        assert_eq!(decide_severity(&v, Some(&vehicle(4, false))), None);
    }

    #[test]
    fn test_count_threshold_is_medium() {
        let v = violation("NO_HELMET", 80.0);
        assert_eq!(
            decide_severity(&v, Some(&vehicle(5, false))),
            Some(AlertSeverity::Medium)
        );
        assert_eq!(decide_severity(&v, Some(&vehicle(4, false))), None);
    }

    #[test]
    fn test_low_risk_first_offense_no_alert() {
        let v = violation("NO_HELMET", 97.0);
        assert_eq!(decide_severity(&v, Some(&vehicle(1, false))), None);
    }

    #[tokio::test]
    async fn test_evaluate_persists_and_publishes() {
        let store = Arc::new(MemoryAlertStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = AlertPolicyEngine::new(store.clone(), sink.clone());

        let alert = engine
            .evaluate(&violation("WRONG_WAY", 90.0), None)
            .await
            .unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(store.all().await.len(), 1);
        assert_eq!(sink.count(Topic::AlertNew).await, 1);
    }

    #[tokio::test]
    async fn test_evaluate_no_match_creates_nothing() {
        let store = Arc::new(MemoryAlertStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = AlertPolicyEngine::new(store.clone(), sink.clone());

        assert!(engine
            .evaluate(&violation("NO_HELMET", 80.0), None)
            .await
            .is_none());
        assert!(store.all().await.is_empty());
        assert_eq!(sink.count(Topic::AlertNew).await, 0);
    }

    #[tokio::test]
    async fn test_status_transitions_are_forward_only() {
        let store = Arc::new(MemoryAlertStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = AlertPolicyEngine::new(store.clone(), sink.clone());

        let alert = engine
            .evaluate(&violation("WRONG_WAY", 90.0), None)
            .await
            .unwrap();

        let acked = engine
            .update_status(&alert.id, AlertStatus::Acknowledged)
            .await
            .unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert!(acked.acknowledged_at.is_some());

        let resolved = engine
            .update_status(&alert.id, AlertStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        // Backward transition rejected
        let err = engine
            .update_status(&alert.id, AlertStatus::Acknowledged)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
