//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::alert_policy::AlertStatus;
use crate::audit_log::AuditLogEntry;
use crate::cameras::{Camera, CameraStatus, HealthStatus, HeartbeatRequest, RegisterCameraRequest};
use crate::enforcement_pipeline::SubmitViolationRequest;
use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::state::AppState;
use crate::violations::{ViolationPage, ViolationStatus};

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/system/status", get(system_status))
        .route("/api/analytics", get(analytics))
        // Violations
        .route("/api/violations", get(list_violations))
        .route("/api/violations", post(submit_violation))
        .route("/api/violations/:id", get(get_violation))
        .route("/api/violations/:id/fine", get(get_fine_details))
        .route("/api/violations/:id/status", patch(patch_violation_status))
        // Vehicles
        .route("/api/vehicles/:plate_number", get(get_vehicle))
        .route("/api/vehicles/:plate_number/blacklist", post(set_blacklist))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:id/status", patch(patch_alert_status))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/status", get(camera_status_summary))
        .route("/api/cameras/register", post(register_camera))
        .route("/api/cameras/:id", get(get_camera))
        .route("/api/cameras/:id/heartbeat", post(camera_heartbeat))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

/// Elevated-privilege caller marker. Session mechanics live in the external
/// auth layer; this only identifies the operator for audit purposes.
fn operator_id(headers: &HeaderMap) -> Result<String> {
    headers
        .get("x-operator-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Forbidden("x-operator-id header is required".to_string()))
}

// ========================================
// Violation Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct ListViolationsQuery {
    limit: Option<u32>,
    page: Option<u32>,
    status: Option<String>,
}

async fn list_violations(
    State(state): State<AppState>,
    Query(query): Query<ListViolationsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let page = query.page.unwrap_or(1).max(1);

    let status = match query.status.as_deref() {
        Some(raw) => match ViolationStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return Error::Validation(format!("Unknown status filter: {}", raw))
                    .into_response()
            }
        },
        None => None,
    };

    match state
        .violations
        .list(status, limit, (page - 1) * limit)
        .await
    {
        Ok((data, total)) => Json(ViolationPage {
            data,
            total,
            page,
            limit,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Detection ingestion (called by the AI service)
async fn submit_violation(
    State(state): State<AppState>,
    Json(req): Json<SubmitViolationRequest>,
) -> impl IntoResponse {
    match state.pipeline.submit(req).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_violation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.violations.find_enriched(&id).await {
        Ok(Some(violation)) => Json(ApiResponse::success(violation)).into_response(),
        Ok(None) => Error::NotFound(format!("Violation {} not found", id)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_fine_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.pipeline.fine_details(&id).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PatchStatusRequest {
    status: String,
}

async fn patch_violation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PatchStatusRequest>,
) -> impl IntoResponse {
    let operator = match operator_id(&headers) {
        Ok(operator) => operator,
        Err(e) => return e.into_response(),
    };

    let Some(status) = ViolationStatus::parse_transition(&req.status) else {
        return Error::Validation(format!(
            "status must be verified, rejected or dispatched (got {})",
            req.status
        ))
        .into_response();
    };

    match state.pipeline.update_status(&id, status, &operator).await {
        Ok(violation) => Json(ApiResponse::success(violation)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Vehicle Handlers
// ========================================

async fn get_vehicle(
    State(state): State<AppState>,
    Path(plate_number): Path<String>,
) -> impl IntoResponse {
    let vehicle = match state.ledger.get(&plate_number).await {
        Ok(Some(vehicle)) => vehicle,
        Ok(None) => {
            return Error::NotFound(format!("Vehicle {} not found", plate_number)).into_response()
        }
        Err(e) => return e.into_response(),
    };

    match state.violations.list_by_plate(&plate_number, 10).await {
        Ok(violations) => Json(json!({
            "vehicle": vehicle,
            "violations": violations,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct BlacklistRequest {
    blacklisted: bool,
}

async fn set_blacklist(
    State(state): State<AppState>,
    Path(plate_number): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BlacklistRequest>,
) -> impl IntoResponse {
    let operator = match operator_id(&headers) {
        Ok(operator) => operator,
        Err(e) => return e.into_response(),
    };

    match state
        .ledger
        .set_blacklist(&plate_number, req.blacklisted)
        .await
    {
        Ok(vehicle) => {
            let action = if req.blacklisted {
                "SET_BLACKLIST"
            } else {
                "CLEAR_BLACKLIST"
            };
            if let Err(e) = state
                .audit
                .record(&AuditLogEntry::new(&operator, action, "Vehicle", &plate_number))
                .await
            {
                tracing::error!(error = %e, "Audit log write failed");
            }

            Json(ApiResponse::success(vehicle)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ========================================
// Alert Handlers
// ========================================

async fn list_alerts(State(state): State<AppState>) -> impl IntoResponse {
    match state.alerts.list_open().await {
        Ok(alerts) => Json(ApiResponse::success(alerts)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn patch_alert_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PatchStatusRequest>,
) -> impl IntoResponse {
    if let Err(e) = operator_id(&headers) {
        return e.into_response();
    }

    let status = match AlertStatus::parse(&req.status) {
        Some(AlertStatus::Active) | None => {
            return Error::Validation(format!(
                "status must be ACKNOWLEDGED or RESOLVED (got {})",
                req.status
            ))
            .into_response()
        }
        Some(status) => status,
    };

    match state.alerts.update_status(&id, status).await {
        Ok(alert) => Json(ApiResponse::success(alert)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Camera Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    match state.cameras.list().await {
        Ok(cameras) => Json(ApiResponse::success(cameras)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_camera(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.cameras.find(&id).await {
        Ok(Some(camera)) => Json(ApiResponse::success(camera)).into_response(),
        Ok(None) => Error::NotFound(format!("Camera {} not found", id)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn camera_status_summary(State(state): State<AppState>) -> impl IntoResponse {
    match state.cameras.status_summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn register_camera(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterCameraRequest>,
) -> impl IntoResponse {
    let operator = match operator_id(&headers) {
        Ok(operator) => operator,
        Err(e) => return e.into_response(),
    };

    if req.name.trim().is_empty() {
        return Error::Validation("camera name is required".to_string()).into_response();
    }

    let camera = Camera {
        id: Uuid::new_v4().to_string(),
        name: req.name.clone(),
        location: req.location.clone(),
        rtsp_url: req.rtsp_url.clone(),
        location_lat: req.location_lat,
        location_lng: req.location_lng,
        status: CameraStatus::Online,
        health_status: HealthStatus::Healthy,
        last_heartbeat: Some(Utc::now()),
        current_fps: 0.0,
        latency_ms: 0,
        failure_count: 0,
        created_at: Utc::now(),
    };

    if let Err(e) = state.cameras.register(&camera).await {
        return e.into_response();
    }

    if let Err(e) = state
        .audit
        .record(&AuditLogEntry::new(
            &operator,
            "ADD_CAMERA",
            "Camera",
            &camera.id,
        ))
        .await
    {
        tracing::error!(error = %e, "Audit log write failed");
    }

    (StatusCode::CREATED, Json(ApiResponse::success(camera))).into_response()
}

/// Unauthenticated: pinged directly by the edge AI service
async fn camera_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    match state.heartbeat.process(&id, &req).await {
        Ok(camera) => Json(json!({
            "success": true,
            "health": camera.health_status,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Metrics Handlers
// ========================================

async fn analytics(State(state): State<AppState>) -> impl IntoResponse {
    let total = match state.violations.count_all().await {
        Ok(total) => total,
        Err(e) => return e.into_response(),
    };

    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now);
    let today = match state.violations.count_since(midnight).await {
        Ok(today) => today,
        Err(e) => return e.into_response(),
    };

    let confidences = match state.violations.recent_confidences(100).await {
        Ok(confidences) => confidences,
        Err(e) => return e.into_response(),
    };
    let ai_confidence_average = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let active_cameras = match state.cameras.count_online().await {
        Ok(count) => count,
        Err(e) => return e.into_response(),
    };

    Json(json!({
        "metrics": {
            "total_violations": total,
            "today_violations": today,
            "active_cameras": active_cameras,
            "ai_confidence_average": ai_confidence_average,
        }
    }))
    .into_response()
}

async fn system_status(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.system_health.read().await.clone();

    Json(json!({
        "healthy": !health.overloaded,
        "cpu_percent": health.cpu_percent,
        "memory_percent": health.memory_percent,
        "ws_clients": state.realtime.connection_count(),
    }))
}

// ========================================
// WebSocket Handler
// ========================================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = state.realtime.register().await;

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Drain incoming frames until the client goes away
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.realtime.unregister(&conn_id).await;
}
