//! Enforcement Pipeline - detection orchestrator
//!
//! ## Responsibilities
//!
//! Runs every inbound detection through strictly sequential stages:
//!
//! 1. Validate required fields (kind, confidence, camera id)
//! 2. Persist the base violation record
//! 3. Vehicle ledger update (absent plate -> no snapshot)
//! 4. Fine computation
//! 5. Attach fine to the record (second write to the same row)
//! 6. Re-enrich (join camera/vehicle) for broadcast
//! 7. Publish violation/fine events
//! 8. Alert evaluation
//!
//! "Never lose a captured violation": a failure after stage 2 leaves the
//! record queryable with nulled downstream fields and reports
//! `PartiallyCompleted`, it never rolls the base write back. Publish and
//! alert failures degrade silently. No stage retries; at-least-once delivery
//! of the same physical detection creates a duplicate record (no dedup key
//! exists in this design).

use crate::alert_policy::AlertPolicyEngine;
use crate::audit_log::{AuditLogEntry, AuditLogStore};
use crate::error::{Error, Result};
use crate::event_bus::{EventSink, Topic};
use crate::fine_rules::{applied_multiplier, FineEngine};
use crate::models::NumericField;
use crate::vehicle_ledger::{RiskLevel, VehicleLedger};
use crate::violations::{
    EnrichedViolation, FineStatus, Violation, ViolationStatus, ViolationStore,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Inbound detection, as submitted by the AI/camera service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitViolationRequest {
    #[serde(rename = "type", alias = "violation_type")]
    pub violation_type: Option<String>,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub confidence_score: Option<NumericField>,
    pub threat_score: Option<NumericField>,
    pub camera_id: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub evidence_url: Option<String>,
    pub video_timestamp_sec: Option<f64>,
    pub bounding_box: Option<serde_json::Value>,
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// All stages ran
    Completed,
    /// Base record persisted, a later stage failed
    PartiallyCompleted,
}

/// Pipeline result returned to the ingesting service
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub outcome: PipelineOutcome,
    #[serde(flatten)]
    pub violation: EnrichedViolation,
}

/// Live recalculation breakdown for the fine audit query
#[derive(Debug, Clone, Serialize)]
pub struct FineCalculation {
    pub base_amount: i64,
    pub repeat_multiplier: f64,
    pub applied_multiplier: f64,
    pub vehicle_violation_count: i64,
    pub risk_level: RiskLevel,
}

/// Frozen fine + what the rule would say now
#[derive(Debug, Clone, Serialize)]
pub struct FineDetails {
    pub fine_amount: Option<i64>,
    pub fine_status: Option<FineStatus>,
    pub calculation: FineCalculation,
}

/// Validated detection fields, produced by the ingest stage
struct ValidatedDetection {
    violation_type: String,
    camera_id: String,
    confidence_score: f64,
    threat_score: f64,
}

/// The orchestrator. All collaborators are injected; the bus is a capability
/// parameter, never ambient state.
pub struct EnforcementPipeline {
    violations: Arc<dyn ViolationStore>,
    ledger: Arc<VehicleLedger>,
    fines: Arc<FineEngine>,
    alerts: Arc<AlertPolicyEngine>,
    audit: Arc<dyn AuditLogStore>,
    bus: Arc<dyn EventSink>,
}

impl EnforcementPipeline {
    pub fn new(
        violations: Arc<dyn ViolationStore>,
        ledger: Arc<VehicleLedger>,
        fines: Arc<FineEngine>,
        alerts: Arc<AlertPolicyEngine>,
        audit: Arc<dyn AuditLogStore>,
        bus: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            violations,
            ledger,
            fines,
            alerts,
            audit,
            bus,
        }
    }

    /// Stage 1: field validation. Rejects before any write.
    fn validate(req: &SubmitViolationRequest) -> Result<ValidatedDetection> {
        let violation_type = req
            .violation_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Validation("violation type is required".to_string()))?;

        let camera_id = req
            .camera_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Validation("camera_id is required".to_string()))?;

        let confidence_score = req
            .confidence_score
            .as_ref()
            .ok_or_else(|| Error::Validation("confidence_score is required".to_string()))?
            .as_f64()
            .ok_or_else(|| Error::Validation("confidence_score must be numeric".to_string()))?;

        let threat_score = match &req.threat_score {
            Some(raw) => raw
                .as_f64()
                .ok_or_else(|| Error::Validation("threat_score must be numeric".to_string()))?,
            None => 0.0,
        };

        Ok(ValidatedDetection {
            violation_type: violation_type.to_string(),
            camera_id: camera_id.to_string(),
            confidence_score,
            threat_score,
        })
    }

    /// Run the full pipeline for one detection
    pub async fn submit(&self, req: SubmitViolationRequest) -> Result<PipelineResult> {
        // Stage 1: ingest validation
        let detection = Self::validate(&req)?;

        let plate_number = req
            .plate_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from);

        // Stage 2: persist base record. Store failure here is fatal for the
        // request; nothing has been written yet that could be lost.
        let mut violation = Violation {
            id: Uuid::new_v4().to_string(),
            violation_type: detection.violation_type.clone(),
            plate_number: plate_number.clone(),
            vehicle_type: req.vehicle_type.clone(),
            confidence_score: detection.confidence_score,
            threat_score: detection.threat_score,
            camera_id: detection.camera_id.clone(),
            location_lat: req.location_lat,
            location_lng: req.location_lng,
            evidence_url: req.evidence_url.clone(),
            video_timestamp_sec: req.video_timestamp_sec,
            bounding_box: req.bounding_box.clone(),
            fine_amount: None,
            fine_status: None,
            fine_generated_at: None,
            status: ViolationStatus::Pending,
            verified_by: None,
            verified_at: None,
            created_at: Utc::now(),
        };
        self.violations.create(&violation).await?;

        tracing::info!(
            violation_id = %violation.id,
            violation_type = %violation.violation_type,
            camera_id = %violation.camera_id,
            plate_number = ?violation.plate_number,
            "Violation recorded"
        );

        // Stage 3: vehicle ledger update
        let vehicle = match self.ledger.record_violation(plate_number.as_deref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(
                    violation_id = %violation.id,
                    error = %e,
                    "Ledger update failed, violation left partial"
                );
                return Ok(self.partial(violation).await);
            }
        };
        let vehicle_count = vehicle.as_ref().map_or(0, |v| v.total_violations);

        // Stage 4: fine computation
        let fine_amount = match self
            .fines
            .calculate(&violation.violation_type, vehicle_count)
            .await
        {
            Ok(amount) => amount,
            Err(e) => {
                tracing::error!(
                    violation_id = %violation.id,
                    error = %e,
                    "Fine computation failed, violation left partial"
                );
                return Ok(self.partial(violation).await);
            }
        };

        // Stage 5: attach fine (second write to the same row)
        let fine_generated_at = Utc::now();
        if let Err(e) = self
            .violations
            .attach_fine(&violation.id, fine_amount, fine_generated_at)
            .await
        {
            tracing::error!(
                violation_id = %violation.id,
                fine_amount = fine_amount,
                error = %e,
                "Fine attachment failed, violation left partial"
            );
            return Ok(self.partial(violation).await);
        }
        violation.fine_amount = Some(fine_amount);
        violation.fine_status = Some(FineStatus::Pending);
        violation.fine_generated_at = Some(fine_generated_at);

        // Stage 6: re-enrich for broadcast. A failed read degrades to the
        // bare record rather than dropping the run.
        let enriched = match self.violations.find_enriched(&violation.id).await {
            Ok(Some(enriched)) => enriched,
            Ok(None) | Err(_) => EnrichedViolation {
                violation: violation.clone(),
                camera: None,
                vehicle: None,
            },
        };

        // Stage 7: publish (fire-and-forget; the persisted record never
        // depends on the broker)
        if let Ok(payload) = serde_json::to_value(&enriched) {
            self.bus.publish_lossy(Topic::ViolationNew, &payload).await;
        }
        let fine_event = serde_json::json!({
            "violation_id": violation.id,
            "fine_amount": fine_amount,
            "plate_number": violation.plate_number,
        });
        self.bus.publish_lossy(Topic::FineGenerated, &fine_event).await;

        // Stage 8: alert evaluation (degraded-safe internally)
        self.alerts
            .evaluate(&enriched.violation, vehicle.as_ref())
            .await;

        Ok(PipelineResult {
            outcome: PipelineOutcome::Completed,
            violation: enriched,
        })
    }

    /// Wrap a partially processed record. Downstream stages have not run;
    /// the record stays queryable for manual reconciliation.
    async fn partial(&self, violation: Violation) -> PipelineResult {
        PipelineResult {
            outcome: PipelineOutcome::PartiallyCompleted,
            violation: EnrichedViolation {
                violation,
                camera: None,
                vehicle: None,
            },
        }
    }

    /// Operator status transition: verified / rejected / dispatched.
    /// Audit-logged, republished as `violation:verified`. No transition guard
    /// between terminal statuses exists by design.
    pub async fn update_status(
        &self,
        violation_id: &str,
        status: ViolationStatus,
        operator_id: &str,
    ) -> Result<Violation> {
        let violation = self
            .violations
            .update_status(violation_id, status, operator_id, Utc::now())
            .await?
            .ok_or_else(|| Error::NotFound(format!("Violation {} not found", violation_id)))?;

        self.audit
            .record(&AuditLogEntry::new(
                operator_id,
                "UPDATE_STATUS",
                "Violation",
                violation_id,
            ))
            .await?;

        tracing::info!(
            violation_id = %violation_id,
            status = %status.as_str(),
            operator_id = %operator_id,
            "Violation status updated"
        );

        if let Ok(payload) = serde_json::to_value(&violation) {
            self.bus
                .publish_lossy(Topic::ViolationVerified, &payload)
                .await;
        }

        Ok(violation)
    }

    /// Read-only fine audit query: the frozen fine plus what the current rule
    /// and vehicle state would produce now. Never mutates the record.
    pub async fn fine_details(&self, violation_id: &str) -> Result<FineDetails> {
        let violation = self
            .violations
            .find(violation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Violation {} not found", violation_id)))?;

        let rule = self.fines.resolve(&violation.violation_type).await?;

        let vehicle = match violation.plate_number.as_deref() {
            Some(plate) => self.ledger.get(plate).await?,
            None => None,
        };
        let vehicle_count = vehicle.as_ref().map_or(0, |v| v.total_violations);
        let risk_level = vehicle.as_ref().map_or(RiskLevel::Low, |v| v.risk_level);

        let calculation = match rule {
            Some(rule) => FineCalculation {
                base_amount: rule.base_amount,
                repeat_multiplier: rule.repeat_multiplier.unwrap_or(1.0),
                applied_multiplier: applied_multiplier(&rule, vehicle_count),
                vehicle_violation_count: vehicle_count,
                risk_level,
            },
            None => FineCalculation {
                base_amount: 0,
                repeat_multiplier: 1.0,
                applied_multiplier: 1.0,
                vehicle_violation_count: vehicle_count,
                risk_level,
            },
        };

        Ok(FineDetails {
            fine_amount: violation.fine_amount,
            fine_status: violation.fine_status,
            calculation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_policy::{AlertSeverity, MemoryAlertStore};
    use crate::audit_log::MemoryAuditLogStore;
    use crate::event_bus::MemorySink;
    use crate::fine_rules::MemoryFineRuleStore;
    use crate::vehicle_ledger::MemoryVehicleStore;
    use crate::violations::MemoryViolationStore;

    struct Fixture {
        pipeline: EnforcementPipeline,
        violations: Arc<MemoryViolationStore>,
        alerts: Arc<MemoryAlertStore>,
        sink: Arc<MemorySink>,
    }

    async fn fixture() -> Fixture {
        let violations = Arc::new(MemoryViolationStore::new());
        let alerts = Arc::new(MemoryAlertStore::new());
        let sink = Arc::new(MemorySink::new());
        let rules = Arc::new(MemoryFineRuleStore::with_standard_rules().await);

        let pipeline = EnforcementPipeline::new(
            violations.clone(),
            Arc::new(VehicleLedger::new(Arc::new(MemoryVehicleStore::new()))),
            Arc::new(FineEngine::new(rules)),
            Arc::new(AlertPolicyEngine::new(alerts.clone(), sink.clone())),
            Arc::new(MemoryAuditLogStore::new()),
            sink.clone(),
        );

        Fixture {
            pipeline,
            violations,
            alerts,
            sink,
        }
    }

    fn detection(kind: &str, plate: Option<&str>, confidence: f64) -> SubmitViolationRequest {
        SubmitViolationRequest {
            violation_type: Some(kind.to_string()),
            plate_number: plate.map(String::from),
            confidence_score: Some(NumericField::Number(confidence)),
            camera_id: Some("cam-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_detection_full_run() {
        // Scenario: NO_HELMET, fresh plate, confidence 97. Count 1, risk LOW,
        // fine = base 500, no alert.
        let f = fixture().await;
        let result = f
            .pipeline
            .submit(detection("NO_HELMET", Some("DL01AB1234"), 97.0))
            .await
            .unwrap();

        assert_eq!(result.outcome, PipelineOutcome::Completed);
        assert_eq!(result.violation.violation.fine_amount, Some(500));
        assert_eq!(
            result.violation.violation.fine_status,
            Some(FineStatus::Pending)
        );
        assert!(f.alerts.all().await.is_empty());
        assert_eq!(f.sink.count(Topic::ViolationNew).await, 1);
        assert_eq!(f.sink.count(Topic::FineGenerated).await, 1);
        assert_eq!(f.sink.count(Topic::AlertNew).await, 0);
    }

    #[tokio::test]
    async fn test_eleventh_wrong_way_escalates_fully() {
        // Scenario: 11 WRONG_WAY detections for one plate. The 11th lands at
        // risk CRITICAL with fine floor(1500 * 2.5 * 1.5) = 5625 and a
        // CRITICAL alert (rule 1 fires on the kind alone every time).
        let f = fixture().await;
        let mut last = None;
        for _ in 0..11 {
            last = Some(
                f.pipeline
                    .submit(detection("WRONG_WAY", Some("KA05XY9999"), 92.0))
                    .await
                    .unwrap(),
            );
        }

        let last = last.unwrap();
        assert_eq!(last.outcome, PipelineOutcome::Completed);
        assert_eq!(last.violation.violation.fine_amount, Some(5625));

        let alerts = f.alerts.all().await;
        assert_eq!(alerts.len(), 11);
        assert!(alerts.iter().all(|a| a.severity == AlertSeverity::Critical));
    }

    #[tokio::test]
    async fn test_missing_camera_rejects_without_writes() {
        let f = fixture().await;
        let mut req = detection("NO_HELMET", None, 90.0);
        req.camera_id = None;

        let err = f.pipeline.submit(req).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.violations.count_all().await.unwrap(), 0);
        assert!(f.sink.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_kind_rejects() {
        let f = fixture().await;
        let mut req = detection("NO_HELMET", None, 90.0);
        req.violation_type = Some("  ".to_string());

        let err = f.pipeline.submit(req).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_malformed_confidence_rejects() {
        let f = fixture().await;
        let mut req = detection("NO_HELMET", None, 90.0);
        req.confidence_score = Some(NumericField::Text("very sure".to_string()));

        let err = f.pipeline.submit(req).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.violations.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_numeric_string_confidence_accepted() {
        let f = fixture().await;
        let mut req = detection("NO_HELMET", None, 0.0);
        req.confidence_score = Some(NumericField::Text("88.5".to_string()));

        let result = f.pipeline.submit(req).await.unwrap();
        assert_eq!(result.violation.violation.confidence_score, 88.5);
    }

    #[tokio::test]
    async fn test_unreadable_plate_fines_at_count_zero() {
        let f = fixture().await;
        let result = f
            .pipeline
            .submit(detection("RED_LIGHT", None, 90.0))
            .await
            .unwrap();

        assert_eq!(result.outcome, PipelineOutcome::Completed);
        // No vehicle history: base amount applies
        assert_eq!(result.violation.violation.fine_amount, Some(1000));
    }

    #[tokio::test]
    async fn test_unknown_kind_gets_zero_fine_not_error() {
        let f = fixture().await;
        let result = f
            .pipeline
            .submit(detection("JAYWALKING", Some("TN10ZZ0042"), 90.0))
            .await
            .unwrap();

        assert_eq!(result.outcome, PipelineOutcome::Completed);
        assert_eq!(result.violation.violation.fine_amount, Some(0));
    }

    #[tokio::test]
    async fn test_fine_attach_failure_leaves_partial_record() {
        let f = fixture().await;
        f.violations.fail_attach_fine(true);

        let result = f
            .pipeline
            .submit(detection("NO_HELMET", Some("MH12AA0001"), 90.0))
            .await
            .unwrap();

        assert_eq!(result.outcome, PipelineOutcome::PartiallyCompleted);
        assert_eq!(result.violation.violation.fine_amount, None);

        // Base record survives for manual reconciliation
        let stored = f
            .violations
            .find(&result.violation.violation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fine_amount, None);

        // Downstream stages did not run
        assert_eq!(f.sink.count(Topic::ViolationNew).await, 0);
        assert_eq!(f.sink.count(Topic::FineGenerated).await, 0);
    }

    #[tokio::test]
    async fn test_bus_failure_does_not_fail_the_run() {
        let violations = Arc::new(MemoryViolationStore::new());
        let rules = Arc::new(MemoryFineRuleStore::with_standard_rules().await);
        let failing = Arc::new(crate::event_bus::FailingSink);

        let pipeline = EnforcementPipeline::new(
            violations.clone(),
            Arc::new(VehicleLedger::new(Arc::new(MemoryVehicleStore::new()))),
            Arc::new(FineEngine::new(rules)),
            Arc::new(AlertPolicyEngine::new(
                Arc::new(MemoryAlertStore::new()),
                failing.clone(),
            )),
            Arc::new(MemoryAuditLogStore::new()),
            failing,
        );

        let result = pipeline
            .submit(detection("NO_HELMET", Some("DL01AB1234"), 97.0))
            .await
            .unwrap();
        assert_eq!(result.outcome, PipelineOutcome::Completed);
        assert_eq!(result.violation.violation.fine_amount, Some(500));
    }

    #[tokio::test]
    async fn test_status_transition_publishes_and_audits() {
        let f = fixture().await;
        let result = f
            .pipeline
            .submit(detection("NO_HELMET", Some("DL01AB1234"), 97.0))
            .await
            .unwrap();
        let id = result.violation.violation.id.clone();

        let updated = f
            .pipeline
            .update_status(&id, ViolationStatus::Verified, "op-7")
            .await
            .unwrap();
        assert_eq!(updated.status, ViolationStatus::Verified);
        assert_eq!(updated.verified_by.as_deref(), Some("op-7"));
        assert!(updated.verified_at.is_some());
        assert_eq!(f.sink.count(Topic::ViolationVerified).await, 1);
    }

    #[tokio::test]
    async fn test_status_transition_unknown_id_is_not_found() {
        let f = fixture().await;
        let err = f
            .pipeline
            .update_status("missing", ViolationStatus::Verified, "op-7")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fine_details_breakdown_and_purity() {
        let f = fixture().await;

        // Build history: 3 prior NO_HELMET violations -> repeat tier
        let mut id = String::new();
        for _ in 0..3 {
            let result = f
                .pipeline
                .submit(detection("NO_HELMET", Some("DL01AB1234"), 97.0))
                .await
                .unwrap();
            id = result.violation.violation.id.clone();
        }

        let details = f.pipeline.fine_details(&id).await.unwrap();
        assert_eq!(details.calculation.base_amount, 500);
        assert_eq!(details.calculation.repeat_multiplier, 1.5);
        assert_eq!(details.calculation.applied_multiplier, 1.5);
        assert_eq!(details.calculation.vehicle_violation_count, 3);
        assert_eq!(details.calculation.risk_level, RiskLevel::Medium);
        // The third detection was charged at count 3: floor(500 * 1.5)
        assert_eq!(details.fine_amount, Some(750));

        // Pure read: calling again never mutates the frozen fine
        let again = f.pipeline.fine_details(&id).await.unwrap();
        assert_eq!(again.fine_amount, Some(750));
        let stored = f.violations.find(&id).await.unwrap().unwrap();
        assert_eq!(stored.fine_amount, Some(750));
    }

    #[tokio::test]
    async fn test_fine_details_unknown_rule_zeroes_breakdown() {
        let f = fixture().await;
        let result = f
            .pipeline
            .submit(detection("JAYWALKING", None, 90.0))
            .await
            .unwrap();

        let details = f
            .pipeline
            .fine_details(&result.violation.violation.id)
            .await
            .unwrap();
        assert_eq!(details.calculation.base_amount, 0);
        assert_eq!(details.calculation.applied_multiplier, 1.0);
        assert_eq!(details.fine_amount, Some(0));
    }
}
