//! Cameras - registry and persistence
//!
//! ## Responsibilities
//!
//! - Camera registration and lookup
//! - Heartbeat row updates and liveness-sweep scans
//! - Fleet statistics for the system metrics panel
//!
//! Rows are mutated by heartbeat ingestion and the liveness monitor jointly,
//! both serialized through per-row update semantics.

mod memory;
mod repository;
mod types;

pub use memory::MemoryCameraStore;
pub use repository::{CameraStore, MySqlCameraStore};
pub use types::{
    Camera, CameraStatus, CameraStatusSummary, HealthStatus, HeartbeatRequest,
    RegisterCameraRequest,
};
