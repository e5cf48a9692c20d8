//! Camera repository (MySQL)

use super::types::{Camera, CameraStatus, CameraStatusSummary, HealthStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Camera persistence operations. Heartbeat ingestion and the liveness sweep
/// both converge on the same row via independent per-row updates.
#[async_trait]
pub trait CameraStore: Send + Sync {
    async fn register(&self, camera: &Camera) -> Result<()>;

    async fn find(&self, id: &str) -> Result<Option<Camera>>;

    async fn list(&self) -> Result<Vec<Camera>>;

    /// Apply a heartbeat: status ONLINE, health + metrics refreshed. Metrics
    /// not present in the ping keep their previous value.
    async fn record_heartbeat(
        &self,
        id: &str,
        health: HealthStatus,
        fps: Option<f64>,
        latency_ms: Option<i64>,
        failure_count: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Camera>>;

    /// Cameras still marked ONLINE whose last heartbeat is older than the
    /// threshold (the liveness sweep's scan set)
    async fn find_stalled(&self, older_than: DateTime<Utc>) -> Result<Vec<Camera>>;

    /// Demote to OFFLINE/OFFLINE
    async fn mark_offline(&self, id: &str) -> Result<()>;

    async fn status_summary(&self) -> Result<CameraStatusSummary>;

    async fn count_online(&self) -> Result<i64>;
}

#[derive(Clone)]
pub struct MySqlCameraStore {
    pool: MySqlPool,
}

impl MySqlCameraStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const CAMERA_COLUMNS: &'static str = r#"
        id, name, location, rtsp_url, location_lat, location_lng,
        status, health_status, last_heartbeat,
        current_fps, latency_ms, failure_count, created_at
    "#;

    fn row_to_camera(row: &MySqlRow) -> Result<Camera> {
        let status: String = row.try_get("status")?;
        let health: String = row.try_get("health_status")?;
        let last_heartbeat: Option<chrono::NaiveDateTime> = row.try_get("last_heartbeat")?;
        let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;

        Ok(Camera {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            location: row.try_get("location")?,
            rtsp_url: row.try_get("rtsp_url")?,
            location_lat: row.try_get("location_lat")?,
            location_lng: row.try_get("location_lng")?,
            status: CameraStatus::parse(&status),
            health_status: HealthStatus::parse(&health),
            last_heartbeat: last_heartbeat.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            current_fps: row.try_get("current_fps")?,
            latency_ms: row.try_get("latency_ms")?,
            failure_count: row.try_get("failure_count")?,
            created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        })
    }
}

#[async_trait]
impl CameraStore for MySqlCameraStore {
    async fn register(&self, camera: &Camera) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cameras (
                id, name, location, rtsp_url, location_lat, location_lng,
                status, health_status, last_heartbeat,
                current_fps, latency_ms, failure_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&camera.id)
        .bind(&camera.name)
        .bind(&camera.location)
        .bind(&camera.rtsp_url)
        .bind(camera.location_lat)
        .bind(camera.location_lng)
        .bind(camera.status.as_str())
        .bind(camera.health_status.as_str())
        .bind(camera.last_heartbeat)
        .bind(camera.current_fps)
        .bind(camera.latency_ms)
        .bind(camera.failure_count)
        .bind(camera.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Camera>> {
        let query = format!("SELECT {} FROM cameras WHERE id = ?", Self::CAMERA_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_camera).transpose()
    }

    async fn list(&self) -> Result<Vec<Camera>> {
        let query = format!(
            "SELECT {} FROM cameras ORDER BY created_at DESC",
            Self::CAMERA_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_camera).collect()
    }

    async fn record_heartbeat(
        &self,
        id: &str,
        health: HealthStatus,
        fps: Option<f64>,
        latency_ms: Option<i64>,
        failure_count: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Camera>> {
        let result = sqlx::query(
            r#"
            UPDATE cameras
            SET last_heartbeat = ?,
                status = 'ONLINE',
                health_status = ?,
                current_fps = COALESCE(?, current_fps),
                latency_ms = COALESCE(?, latency_ms),
                failure_count = COALESCE(?, failure_count)
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(health.as_str())
        .bind(fps)
        .bind(latency_ms)
        .bind(failure_count)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    async fn find_stalled(&self, older_than: DateTime<Utc>) -> Result<Vec<Camera>> {
        let query = format!(
            "SELECT {} FROM cameras WHERE status = 'ONLINE' AND (last_heartbeat IS NULL OR last_heartbeat < ?)",
            Self::CAMERA_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_camera).collect()
    }

    async fn mark_offline(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE cameras
            SET status = 'OFFLINE', health_status = 'OFFLINE'
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn status_summary(&self) -> Result<CameraStatusSummary> {
        let online: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cameras WHERE status = 'ONLINE'")
                .fetch_one(&self.pool)
                .await?;
        let offline: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cameras WHERE status = 'OFFLINE'")
                .fetch_one(&self.pool)
                .await?;
        let degraded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cameras WHERE health_status = 'DEGRADED'")
                .fetch_one(&self.pool)
                .await?;

        let row = sqlx::query(
            "SELECT CAST(AVG(current_fps) AS DOUBLE) AS avg_fps, CAST(AVG(latency_ms) AS DOUBLE) AS avg_latency FROM cameras",
        )
        .fetch_one(&self.pool)
        .await?;
        let avg_fps: f64 = row.try_get::<Option<f64>, _>("avg_fps")?.unwrap_or(0.0);
        let avg_latency: f64 = row.try_get::<Option<f64>, _>("avg_latency")?.unwrap_or(0.0);

        Ok(CameraStatusSummary {
            online_cameras: online,
            offline_cameras: offline,
            degraded_cameras: degraded,
            avg_fps,
            avg_latency,
            health: CameraStatusSummary::health_label(online, offline, degraded),
        })
    }

    async fn count_online(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cameras WHERE status = 'ONLINE'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
