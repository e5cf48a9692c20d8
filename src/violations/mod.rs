//! Violation records - persistence layer
//!
//! ## Responsibilities
//!
//! - Violation record storage (two-phase write: base record, then fine)
//! - Enrichment reads (joined with camera/vehicle) for broadcast
//! - Listing/count queries for the dashboard endpoints
//!
//! Records are written by the enforcement pipeline and patched by operator
//! status transitions; they are never deleted in normal operation.

mod memory;
mod repository;
mod types;

pub use memory::MemoryViolationStore;
pub use repository::{MySqlViolationStore, ViolationStore};
pub use types::{
    CameraRef, EnrichedViolation, FineStatus, VehicleRef, Violation, ViolationPage,
    ViolationStatus,
};
