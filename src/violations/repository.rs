//! Violation repository (MySQL)

use super::types::{
    CameraRef, EnrichedViolation, FineStatus, VehicleRef, Violation, ViolationStatus,
};
use crate::error::Result;
use crate::vehicle_ledger::RiskLevel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Violation persistence operations
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Persist the base record (fine fields null, status pending)
    async fn create(&self, violation: &Violation) -> Result<()>;

    /// Second write to the same row: attach the computed fine. Failure leaves
    /// the record in a recognized degraded state, never rolls back creation.
    async fn attach_fine(&self, id: &str, amount: i64, at: DateTime<Utc>) -> Result<()>;

    /// Operator status transition; records the acting operator and timestamp
    async fn update_status(
        &self,
        id: &str,
        status: ViolationStatus,
        operator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Violation>>;

    async fn find(&self, id: &str) -> Result<Option<Violation>>;

    /// Re-read joined with camera/vehicle for broadcast purposes
    async fn find_enriched(&self, id: &str) -> Result<Option<EnrichedViolation>>;

    async fn list(
        &self,
        status: Option<ViolationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Violation>, i64)>;

    async fn list_by_plate(&self, plate_number: &str, limit: u32) -> Result<Vec<Violation>>;

    async fn count_all(&self) -> Result<i64>;

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Confidence scores of the most recent detections, newest first
    async fn recent_confidences(&self, limit: u32) -> Result<Vec<f64>>;
}

#[derive(Clone)]
pub struct MySqlViolationStore {
    pool: MySqlPool,
}

impl MySqlViolationStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const VIOLATION_COLUMNS: &'static str = r#"
        id, violation_type, plate_number, vehicle_type,
        confidence_score, threat_score, camera_id,
        location_lat, location_lng, evidence_url,
        video_timestamp_sec, bounding_box,
        fine_amount, fine_status, fine_generated_at,
        status, verified_by, verified_at, created_at
    "#;

    fn row_to_violation(row: &MySqlRow) -> Result<Violation> {
        let status: String = row.try_get("status")?;
        let fine_status: Option<String> = row.try_get("fine_status")?;
        let bounding_box: Option<String> = row.try_get("bounding_box")?;
        let fine_generated_at: Option<chrono::NaiveDateTime> = row.try_get("fine_generated_at")?;
        let verified_at: Option<chrono::NaiveDateTime> = row.try_get("verified_at")?;
        let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;

        Ok(Violation {
            id: row.try_get("id")?,
            violation_type: row.try_get("violation_type")?,
            plate_number: row.try_get("plate_number")?,
            vehicle_type: row.try_get("vehicle_type")?,
            confidence_score: row.try_get("confidence_score")?,
            threat_score: row.try_get("threat_score")?,
            camera_id: row.try_get("camera_id")?,
            location_lat: row.try_get("location_lat")?,
            location_lng: row.try_get("location_lng")?,
            evidence_url: row.try_get("evidence_url")?,
            video_timestamp_sec: row.try_get("video_timestamp_sec")?,
            bounding_box: bounding_box
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            fine_amount: row.try_get("fine_amount")?,
            fine_status: fine_status.as_deref().and_then(FineStatus::parse),
            fine_generated_at: fine_generated_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            status: ViolationStatus::parse(&status).unwrap_or(ViolationStatus::Pending),
            verified_by: row.try_get("verified_by")?,
            verified_at: verified_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        })
    }
}

#[async_trait]
impl ViolationStore for MySqlViolationStore {
    async fn create(&self, violation: &Violation) -> Result<()> {
        let bounding_box = violation
            .bounding_box
            .as_ref()
            .map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO violations (
                id, violation_type, plate_number, vehicle_type,
                confidence_score, threat_score, camera_id,
                location_lat, location_lng, evidence_url,
                video_timestamp_sec, bounding_box,
                status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&violation.id)
        .bind(&violation.violation_type)
        .bind(&violation.plate_number)
        .bind(&violation.vehicle_type)
        .bind(violation.confidence_score)
        .bind(violation.threat_score)
        .bind(&violation.camera_id)
        .bind(violation.location_lat)
        .bind(violation.location_lng)
        .bind(&violation.evidence_url)
        .bind(violation.video_timestamp_sec)
        .bind(&bounding_box)
        .bind(violation.status.as_str())
        .bind(violation.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn attach_fine(&self, id: &str, amount: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE violations
            SET fine_amount = ?, fine_status = 'pending', fine_generated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(amount)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ViolationStatus,
        operator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Violation>> {
        let result = sqlx::query(
            r#"
            UPDATE violations
            SET status = ?, verified_by = ?, verified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(operator_id)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    async fn find(&self, id: &str) -> Result<Option<Violation>> {
        let query = format!(
            "SELECT {} FROM violations WHERE id = ?",
            Self::VIOLATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_violation).transpose()
    }

    async fn find_enriched(&self, id: &str) -> Result<Option<EnrichedViolation>> {
        let row = sqlx::query(
            r#"
            SELECT
                v.id, v.violation_type, v.plate_number, v.vehicle_type,
                v.confidence_score, v.threat_score, v.camera_id,
                v.location_lat, v.location_lng, v.evidence_url,
                v.video_timestamp_sec, v.bounding_box,
                v.fine_amount, v.fine_status, v.fine_generated_at,
                v.status, v.verified_by, v.verified_at, v.created_at,
                c.id AS cam_id, c.name AS cam_name, c.location AS cam_location,
                veh.plate_number AS veh_plate, veh.total_violations AS veh_total,
                veh.risk_level AS veh_risk, veh.blacklisted AS veh_blacklisted
            FROM violations v
            LEFT JOIN cameras c ON c.id = v.camera_id
            LEFT JOIN vehicles veh ON veh.plate_number = v.plate_number
            WHERE v.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let violation = Self::row_to_violation(&row)?;

        let camera = row
            .try_get::<Option<String>, _>("cam_id")?
            .map(|cam_id| -> Result<CameraRef> {
                Ok(CameraRef {
                    id: cam_id,
                    name: row.try_get("cam_name")?,
                    location: row.try_get("cam_location")?,
                })
            })
            .transpose()?;

        let vehicle = row
            .try_get::<Option<String>, _>("veh_plate")?
            .map(|plate| -> Result<VehicleRef> {
                let risk: String = row.try_get("veh_risk")?;
                Ok(VehicleRef {
                    plate_number: plate,
                    total_violations: row.try_get("veh_total")?,
                    risk_level: RiskLevel::parse(&risk),
                    blacklisted: row.try_get("veh_blacklisted")?,
                })
            })
            .transpose()?;

        Ok(Some(EnrichedViolation {
            violation,
            camera,
            vehicle,
        }))
    }

    async fn list(
        &self,
        status: Option<ViolationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Violation>, i64)> {
        let (rows, total) = match status {
            Some(status) => {
                let query = format!(
                    "SELECT {} FROM violations WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    Self::VIOLATION_COLUMNS
                );
                let rows = sqlx::query(&query)
                    .bind(status.as_str())
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM violations WHERE status = ?")
                        .bind(status.as_str())
                        .fetch_one(&self.pool)
                        .await?;
                (rows, total)
            }
            None => {
                let query = format!(
                    "SELECT {} FROM violations ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    Self::VIOLATION_COLUMNS
                );
                let rows = sqlx::query(&query)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM violations")
                    .fetch_one(&self.pool)
                    .await?;
                (rows, total)
            }
        };

        let violations = rows
            .iter()
            .map(Self::row_to_violation)
            .collect::<Result<Vec<_>>>()?;

        Ok((violations, total))
    }

    async fn list_by_plate(&self, plate_number: &str, limit: u32) -> Result<Vec<Violation>> {
        let query = format!(
            "SELECT {} FROM violations WHERE plate_number = ? ORDER BY created_at DESC LIMIT ?",
            Self::VIOLATION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(plate_number)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_violation).collect()
    }

    async fn count_all(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM violations")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM violations WHERE created_at >= ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn recent_confidences(&self, limit: u32) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            "SELECT confidence_score FROM violations ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get("confidence_score")?))
            .collect()
    }
}
