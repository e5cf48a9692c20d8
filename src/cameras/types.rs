//! Camera types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational status, driven by heartbeats and the liveness sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraStatus {
    Online,
    Offline,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Online => "ONLINE",
            CameraStatus::Offline => "OFFLINE",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ONLINE" => CameraStatus::Online,
            _ => CameraStatus::Offline,
        }
    }
}

/// Node health derived from heartbeat metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Offline,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Offline => "OFFLINE",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "HEALTHY" => HealthStatus::Healthy,
            "DEGRADED" => HealthStatus::Degraded,
            _ => HealthStatus::Offline,
        }
    }
}

/// A monitored camera node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub rtsp_url: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub status: CameraStatus,
    pub health_status: HealthStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub current_fps: f64,
    pub latency_ms: i64,
    pub failure_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Operator camera registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterCameraRequest {
    pub name: String,
    pub location: Option<String>,
    pub rtsp_url: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
}

/// Heartbeat metrics reported by the edge AI service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatRequest {
    pub fps: Option<f64>,
    pub latency_ms: Option<i64>,
    pub failure_count: Option<i64>,
}

/// Fleet statistics for the system metrics panel
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatusSummary {
    pub online_cameras: i64,
    pub offline_cameras: i64,
    pub degraded_cameras: i64,
    pub avg_fps: f64,
    pub avg_latency: f64,
    pub health: &'static str,
}

impl CameraStatusSummary {
    /// Aggregate fleet health label
    pub fn health_label(online: i64, offline: i64, degraded: i64) -> &'static str {
        if online > 0 && offline == 0 && degraded == 0 {
            "OPTIMAL"
        } else if offline > 0 {
            "CRITICAL"
        } else {
            "WARNING"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(CameraStatus::parse("ONLINE"), CameraStatus::Online);
        assert_eq!(CameraStatus::parse("OFFLINE"), CameraStatus::Offline);
        assert_eq!(CameraStatus::parse("junk"), CameraStatus::Offline);
    }

    #[test]
    fn test_health_parse() {
        assert_eq!(HealthStatus::parse("HEALTHY"), HealthStatus::Healthy);
        assert_eq!(HealthStatus::parse("DEGRADED"), HealthStatus::Degraded);
        assert_eq!(HealthStatus::parse("OFFLINE"), HealthStatus::Offline);
    }

    #[test]
    fn test_fleet_health_label() {
        assert_eq!(CameraStatusSummary::health_label(3, 0, 0), "OPTIMAL");
        assert_eq!(CameraStatusSummary::health_label(3, 1, 0), "CRITICAL");
        assert_eq!(CameraStatusSummary::health_label(3, 0, 1), "WARNING");
        assert_eq!(CameraStatusSummary::health_label(0, 0, 0), "WARNING");
    }
}
