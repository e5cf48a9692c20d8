//! In-memory camera store for tests and development

use super::repository::CameraStore;
use super::types::{Camera, CameraStatus, CameraStatusSummary, HealthStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryCameraStore {
    cameras: Mutex<HashMap<String, Camera>>,
}

impl MemoryCameraStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CameraStore for MemoryCameraStore {
    async fn register(&self, camera: &Camera) -> Result<()> {
        self.cameras
            .lock()
            .await
            .insert(camera.id.clone(), camera.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Camera>> {
        Ok(self.cameras.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Camera>> {
        let cameras = self.cameras.lock().await;
        let mut all: Vec<Camera> = cameras.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
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
        let mut cameras = self.cameras.lock().await;
        let Some(camera) = cameras.get_mut(id) else {
            return Ok(None);
        };

        camera.last_heartbeat = Some(now);
        camera.status = CameraStatus::Online;
        camera.health_status = health;
        if let Some(fps) = fps {
            camera.current_fps = fps;
        }
        if let Some(latency) = latency_ms {
            camera.latency_ms = latency;
        }
        if let Some(failures) = failure_count {
            camera.failure_count = failures;
        }

        Ok(Some(camera.clone()))
    }

    async fn find_stalled(&self, older_than: DateTime<Utc>) -> Result<Vec<Camera>> {
        Ok(self
            .cameras
            .lock()
            .await
            .values()
            .filter(|c| {
                c.status == CameraStatus::Online
                    && c.last_heartbeat.map_or(true, |hb| hb < older_than)
            })
            .cloned()
            .collect())
    }

    async fn mark_offline(&self, id: &str) -> Result<()> {
        if let Some(camera) = self.cameras.lock().await.get_mut(id) {
            camera.status = CameraStatus::Offline;
            camera.health_status = HealthStatus::Offline;
        }
        Ok(())
    }

    async fn status_summary(&self) -> Result<CameraStatusSummary> {
        let cameras = self.cameras.lock().await;
        let online = cameras
            .values()
            .filter(|c| c.status == CameraStatus::Online)
            .count() as i64;
        let offline = cameras
            .values()
            .filter(|c| c.status == CameraStatus::Offline)
            .count() as i64;
        let degraded = cameras
            .values()
            .filter(|c| c.health_status == HealthStatus::Degraded)
            .count() as i64;

        let total = cameras.len() as f64;
        let (avg_fps, avg_latency) = if total > 0.0 {
            (
                cameras.values().map(|c| c.current_fps).sum::<f64>() / total,
                cameras.values().map(|c| c.latency_ms as f64).sum::<f64>() / total,
            )
        } else {
            (0.0, 0.0)
        };

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
        Ok(self
            .cameras
            .lock()
            .await
            .values()
            .filter(|c| c.status == CameraStatus::Online)
            .count() as i64)
    }
}
