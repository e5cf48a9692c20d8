//! Alert repository (MySQL)

use super::types::{Alert, AlertSeverity, AlertStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Alert persistence operations
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, alert: &Alert) -> Result<()>;

    async fn find(&self, id: &str) -> Result<Option<Alert>>;

    /// ACTIVE and ACKNOWLEDGED alerts, newest first
    async fn list_open(&self) -> Result<Vec<Alert>>;

    /// Persist a status transition, stamping the matching timestamp
    async fn update_status(
        &self,
        id: &str,
        status: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>>;
}

#[derive(Clone)]
pub struct MySqlAlertStore {
    pool: MySqlPool,
}

impl MySqlAlertStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const ALERT_COLUMNS: &'static str = r#"
        id, violation_id, camera_id, plate_number,
        severity, status, created_at, acknowledged_at, resolved_at
    "#;

    fn row_to_alert(row: &MySqlRow) -> Result<Alert> {
        let severity: String = row.try_get("severity")?;
        let status: String = row.try_get("status")?;
        let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;
        let acknowledged_at: Option<chrono::NaiveDateTime> = row.try_get("acknowledged_at")?;
        let resolved_at: Option<chrono::NaiveDateTime> = row.try_get("resolved_at")?;

        Ok(Alert {
            id: row.try_get("id")?,
            violation_id: row.try_get("violation_id")?,
            camera_id: row.try_get("camera_id")?,
            plate_number: row.try_get("plate_number")?,
            severity: AlertSeverity::parse(&severity),
            status: AlertStatus::parse(&status).unwrap_or(AlertStatus::Active),
            created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
            acknowledged_at: acknowledged_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            resolved_at: resolved_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

#[async_trait]
impl AlertStore for MySqlAlertStore {
    async fn create(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, violation_id, camera_id, plate_number,
                severity, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.violation_id)
        .bind(&alert.camera_id)
        .bind(&alert.plate_number)
        .bind(alert.severity.as_str())
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Alert>> {
        let query = format!("SELECT {} FROM alerts WHERE id = ?", Self::ALERT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_alert).transpose()
    }

    async fn list_open(&self) -> Result<Vec<Alert>> {
        let query = format!(
            "SELECT {} FROM alerts WHERE status IN ('ACTIVE', 'ACKNOWLEDGED') ORDER BY created_at DESC",
            Self::ALERT_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_alert).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        status: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let result = match status {
            AlertStatus::Acknowledged => {
                sqlx::query("UPDATE alerts SET status = ?, acknowledged_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(at)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            AlertStatus::Resolved => {
                sqlx::query("UPDATE alerts SET status = ?, resolved_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(at)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            AlertStatus::Active => {
                sqlx::query("UPDATE alerts SET status = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }
}
