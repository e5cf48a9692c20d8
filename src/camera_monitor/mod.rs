//! Camera Monitor - heartbeat ingestion and liveness sweep
//!
//! ## Responsibilities
//!
//! - Heartbeat ingestion: health derivation from reported metrics, with
//!   edge-triggered degraded/recovered events (publish only on change)
//! - Liveness sweep: periodic, level-triggered reconciliation that demotes
//!   ONLINE cameras with stale heartbeats to OFFLINE
//!
//! The sweep is safe to run concurrently with heartbeat ingestion: both
//! converge on the same persisted row, and a heartbeat arriving mid-sweep
//! simply drops that camera from the next tick's scan set.

use crate::cameras::{Camera, CameraStore, HealthStatus, HeartbeatRequest};
use crate::error::{Error, Result};
use crate::event_bus::{EventSink, Topic};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;

/// Heartbeat fps below which a camera counts as degraded
const DEGRADED_FPS_THRESHOLD: f64 = 10.0;
/// Heartbeat latency above which a camera counts as degraded
const DEGRADED_LATENCY_MS_THRESHOLD: i64 = 500;

/// Health from reported metrics; missing metrics never degrade on their own
pub fn compute_health(fps: Option<f64>, latency_ms: Option<i64>) -> HealthStatus {
    let slow_fps = fps.map_or(false, |f| f < DEGRADED_FPS_THRESHOLD);
    let high_latency = latency_ms.map_or(false, |l| l > DEGRADED_LATENCY_MS_THRESHOLD);

    if slow_fps || high_latency {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Heartbeat ingestion path (unauthenticated, called by the edge AI service)
pub struct HeartbeatService {
    cameras: Arc<dyn CameraStore>,
    bus: Arc<dyn EventSink>,
}

impl HeartbeatService {
    pub fn new(cameras: Arc<dyn CameraStore>, bus: Arc<dyn EventSink>) -> Self {
        Self { cameras, bus }
    }

    /// Apply one heartbeat ping. Publishes degraded/recovered only on the
    /// health-state edge, not on every ping.
    pub async fn process(&self, camera_id: &str, req: &HeartbeatRequest) -> Result<Camera> {
        let before = self
            .cameras
            .find(camera_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))?;

        let health = compute_health(req.fps, req.latency_ms);

        let camera = self
            .cameras
            .record_heartbeat(
                camera_id,
                health,
                req.fps,
                req.latency_ms,
                req.failure_count,
                Utc::now(),
            )
            .await?
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))?;

        match health {
            HealthStatus::Healthy if before.health_status != HealthStatus::Healthy => {
                let payload = serde_json::json!({
                    "id": camera.id,
                    "name": camera.name,
                });
                self.bus.publish_lossy(Topic::CameraRecovered, &payload).await;
                tracing::info!(camera_id = %camera_id, "Camera recovered");
            }
            HealthStatus::Degraded if before.health_status != HealthStatus::Degraded => {
                let payload = serde_json::json!({
                    "id": camera.id,
                    "name": camera.name,
                    "fps": req.fps,
                    "latency": req.latency_ms,
                });
                self.bus.publish_lossy(Topic::CameraDegraded, &payload).await;
                tracing::warn!(
                    camera_id = %camera_id,
                    fps = ?req.fps,
                    latency_ms = ?req.latency_ms,
                    "Camera degraded"
                );
            }
            _ => {}
        }

        Ok(camera)
    }
}

/// LivenessMonitor instance
pub struct LivenessMonitor {
    cameras: Arc<dyn CameraStore>,
    bus: Arc<dyn EventSink>,
    staleness: Duration,
    sweep_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl LivenessMonitor {
    pub fn new(
        cameras: Arc<dyn CameraStore>,
        bus: Arc<dyn EventSink>,
        staleness: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            cameras,
            bus,
            staleness,
            sweep_interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the sweep loop
    pub async fn start(self: &Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Liveness monitor already running");
                return;
            }
            *running = true;
        }

        tracing::info!(
            staleness_sec = self.staleness.as_secs(),
            interval_sec = self.sweep_interval.as_secs(),
            "Starting liveness monitor"
        );

        let monitor = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(monitor.sweep_interval);

            loop {
                ticker.tick().await;

                {
                    let is_running = monitor.running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                if let Err(e) = monitor.sweep().await {
                    tracing::error!(error = %e, "Liveness sweep failed");
                }
            }

            tracing::info!("Liveness monitor stopped");
        });
    }

    /// Stop the sweep loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping liveness monitor");
    }

    /// One reconciliation pass. Idempotent: a camera demoted here no longer
    /// matches the ONLINE filter on the next tick.
    pub async fn sweep(&self) -> Result<usize> {
        let threshold = Utc::now()
            - chrono::Duration::from_std(self.staleness)
                .map_err(|e| Error::Internal(e.to_string()))?;

        let stalled = self.cameras.find_stalled(threshold).await?;

        for camera in &stalled {
            self.cameras.mark_offline(&camera.id).await?;

            tracing::warn!(
                camera_id = %camera.id,
                name = %camera.name,
                last_heartbeat = ?camera.last_heartbeat,
                "Camera heartbeat stalled, marked offline"
            );

            let payload = serde_json::json!({
                "id": camera.id,
                "name": camera.name,
            });
            self.bus.publish_lossy(Topic::CameraOffline, &payload).await;
        }

        Ok(stalled.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cameras::{CameraStatus, MemoryCameraStore};
    use crate::event_bus::MemorySink;
    use chrono::Utc;

    fn camera(id: &str, status: CameraStatus, health: HealthStatus) -> Camera {
        Camera {
            id: id.to_string(),
            name: format!("Camera {}", id),
            location: None,
            rtsp_url: None,
            location_lat: None,
            location_lng: None,
            status,
            health_status: health,
            last_heartbeat: Some(Utc::now()),
            current_fps: 25.0,
            latency_ms: 40,
            failure_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_compute_health_boundaries() {
        assert_eq!(compute_health(Some(10.0), None), HealthStatus::Healthy);
        assert_eq!(compute_health(Some(9.9), None), HealthStatus::Degraded);
        assert_eq!(compute_health(None, Some(500)), HealthStatus::Healthy);
        assert_eq!(compute_health(None, Some(501)), HealthStatus::Degraded);
        assert_eq!(compute_health(None, None), HealthStatus::Healthy);
        assert_eq!(compute_health(Some(5.0), Some(40)), HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_degraded_edge_publishes_once() {
        let store = Arc::new(MemoryCameraStore::new());
        let sink = Arc::new(MemorySink::new());
        store
            .register(&camera("c1", CameraStatus::Online, HealthStatus::Healthy))
            .await
            .unwrap();

        let service = HeartbeatService::new(store.clone(), sink.clone());
        let slow = HeartbeatRequest {
            fps: Some(5.0),
            ..Default::default()
        };

        let updated = service.process("c1", &slow).await.unwrap();
        assert_eq!(updated.health_status, HealthStatus::Degraded);
        assert_eq!(sink.count(Topic::CameraDegraded).await, 1);

        // Still degraded: no further event on repeat heartbeats
        service.process("c1", &slow).await.unwrap();
        service.process("c1", &slow).await.unwrap();
        assert_eq!(sink.count(Topic::CameraDegraded).await, 1);
    }

    #[tokio::test]
    async fn test_recovered_edge_publishes_once() {
        let store = Arc::new(MemoryCameraStore::new());
        let sink = Arc::new(MemorySink::new());
        store
            .register(&camera("c1", CameraStatus::Online, HealthStatus::Degraded))
            .await
            .unwrap();

        let service = HeartbeatService::new(store.clone(), sink.clone());
        let healthy = HeartbeatRequest {
            fps: Some(30.0),
            latency_ms: Some(20),
            ..Default::default()
        };

        service.process("c1", &healthy).await.unwrap();
        assert_eq!(sink.count(Topic::CameraRecovered).await, 1);

        service.process("c1", &healthy).await.unwrap();
        assert_eq!(sink.count(Topic::CameraRecovered).await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_brings_camera_online() {
        let store = Arc::new(MemoryCameraStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut offline = camera("c1", CameraStatus::Offline, HealthStatus::Offline);
        offline.last_heartbeat = None;
        store.register(&offline).await.unwrap();

        let service = HeartbeatService::new(store.clone(), sink.clone());
        let updated = service
            .process("c1", &HeartbeatRequest::default())
            .await
            .unwrap();

        assert_eq!(updated.status, CameraStatus::Online);
        assert_eq!(updated.health_status, HealthStatus::Healthy);
        assert!(updated.last_heartbeat.is_some());
        // OFFLINE -> HEALTHY counts as a recovery edge
        assert_eq!(sink.count(Topic::CameraRecovered).await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_camera_is_not_found() {
        let service = HeartbeatService::new(
            Arc::new(MemoryCameraStore::new()),
            Arc::new(MemorySink::new()),
        );
        let err = service
            .process("ghost", &HeartbeatRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_demotes_stalled_camera_once() {
        let store = Arc::new(MemoryCameraStore::new());
        let sink = Arc::new(MemorySink::new());

        let mut stale = camera("c1", CameraStatus::Online, HealthStatus::Healthy);
        stale.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(120));
        store.register(&stale).await.unwrap();

        let fresh = camera("c2", CameraStatus::Online, HealthStatus::Healthy);
        store.register(&fresh).await.unwrap();

        let monitor = LivenessMonitor::new(
            store.clone(),
            sink.clone(),
            Duration::from_secs(30),
            Duration::from_secs(10),
        );

        let demoted = monitor.sweep().await.unwrap();
        assert_eq!(demoted, 1);
        assert_eq!(sink.count(Topic::CameraOffline).await, 1);

        let c1 = store.find("c1").await.unwrap().unwrap();
        assert_eq!(c1.status, CameraStatus::Offline);
        assert_eq!(c1.health_status, HealthStatus::Offline);

        let c2 = store.find("c2").await.unwrap().unwrap();
        assert_eq!(c2.status, CameraStatus::Online);

        // Level-triggered: the demoted camera no longer matches the scan
        let demoted = monitor.sweep().await.unwrap();
        assert_eq!(demoted, 0);
        assert_eq!(sink.count(Topic::CameraOffline).await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_mid_sweep_excludes_camera_next_tick() {
        let store = Arc::new(MemoryCameraStore::new());
        let sink = Arc::new(MemorySink::new());

        let mut stale = camera("c1", CameraStatus::Online, HealthStatus::Healthy);
        stale.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(120));
        store.register(&stale).await.unwrap();

        let monitor = LivenessMonitor::new(
            store.clone(),
            sink.clone(),
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        monitor.sweep().await.unwrap();

        // Camera comes back
        let service = HeartbeatService::new(store.clone(), sink.clone());
        service
            .process("c1", &HeartbeatRequest::default())
            .await
            .unwrap();

        let demoted = monitor.sweep().await.unwrap();
        assert_eq!(demoted, 0);
    }
}
