//! TrafficWatch Enforcement Server Library
//!
//! Traffic-violation enforcement backend: detection ingestion, fine
//! calculation, repeat-offender tracking, alerting and real-time fan-out.
//!
//! ## Architecture
//!
//! 1. EnforcementPipeline - detection orchestrator (the write path)
//! 2. FineRules - per-kind penalty policy + repeat escalation
//! 3. VehicleLedger - per-plate counts and risk tiers
//! 4. AlertPolicy - operator alert decision/lifecycle
//! 5. EventBus - Redis pub/sub fan-out broker
//! 6. RealtimeHub - WebSocket distribution to dashboard sessions
//! 7. CameraMonitor - heartbeat ingestion + liveness sweep
//! 8. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - Every component gets its collaborators injected; the bus is a
//!   capability parameter, never ambient state
//! - One strongly-typed repository per entity, mockable in tests
//! - Never lose a captured violation: partial pipeline failures leave the
//!   base record queryable instead of rolling back

pub mod alert_policy;
pub mod audit_log;
pub mod camera_monitor;
pub mod cameras;
pub mod enforcement_pipeline;
pub mod event_bus;
pub mod fine_rules;
pub mod models;
pub mod realtime_hub;
pub mod vehicle_ledger;
pub mod violations;
pub mod web_api;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
