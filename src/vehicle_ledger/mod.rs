//! Vehicle Ledger - repeat-offender tracking
//!
//! ## Responsibilities
//!
//! - Per-plate violation counts and risk tier derivation
//! - Operator blacklist flag (forces CRITICAL while set)
//!
//! The only component with cross-event mutable state. Counting is serialized
//! per plate by the store; concurrent detections for the same plate must both
//! land, never overwrite each other.

mod memory;
mod repository;
mod types;

pub use memory::MemoryVehicleStore;
pub use repository::{MySqlVehicleStore, VehicleStore};
pub use types::{RiskLevel, Vehicle};

use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;

/// Ledger front-end owning all vehicle mutations
pub struct VehicleLedger {
    store: Arc<dyn VehicleStore>,
}

impl VehicleLedger {
    pub fn new(store: Arc<dyn VehicleStore>) -> Self {
        Self { store }
    }

    /// Record one detection against a plate. Empty/absent plates accrue no
    /// history and return no snapshot.
    pub async fn record_violation(&self, plate_number: Option<&str>) -> Result<Option<Vehicle>> {
        let Some(plate) = plate_number.map(str::trim).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };

        let vehicle = self.store.record_violation(plate, Utc::now()).await?;

        tracing::info!(
            plate_number = %vehicle.plate_number,
            total_violations = vehicle.total_violations,
            risk_level = %vehicle.risk_level.as_str(),
            "Vehicle ledger updated"
        );

        Ok(Some(vehicle))
    }

    /// Operator blacklist action
    pub async fn set_blacklist(&self, plate_number: &str, blacklisted: bool) -> Result<Vehicle> {
        let vehicle = self
            .store
            .set_blacklist(plate_number, blacklisted)
            .await?
            .ok_or_else(|| {
                crate::error::Error::NotFound(format!("Vehicle {} not found", plate_number))
            })?;

        tracing::info!(
            plate_number = %plate_number,
            blacklisted = blacklisted,
            risk_level = %vehicle.risk_level.as_str(),
            "Vehicle blacklist updated"
        );

        Ok(vehicle)
    }

    /// Lookup, no mutation
    pub async fn get(&self, plate_number: &str) -> Result<Option<Vehicle>> {
        self.store.find_by_plate(plate_number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> VehicleLedger {
        VehicleLedger::new(Arc::new(MemoryVehicleStore::new()))
    }

    #[tokio::test]
    async fn test_absent_plate_returns_no_snapshot() {
        let ledger = ledger();
        assert!(ledger.record_violation(None).await.unwrap().is_none());
        assert!(ledger.record_violation(Some("")).await.unwrap().is_none());
        assert!(ledger.record_violation(Some("  ")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_violation_creates_vehicle() {
        let ledger = ledger();
        let v = ledger
            .record_violation(Some("DL01AB1234"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v.total_violations, 1);
        assert_eq!(v.risk_level, RiskLevel::Low);
        assert!(!v.blacklisted);
    }

    #[tokio::test]
    async fn test_sequential_counts_are_exact() {
        let ledger = ledger();
        for expected in 1..=12 {
            let v = ledger
                .record_violation(Some("KA05XY9999"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(v.total_violations, expected);
            assert_eq!(v.risk_level, RiskLevel::from_count(expected));
        }
    }

    #[tokio::test]
    async fn test_concurrent_counts_are_not_lost() {
        let store = Arc::new(MemoryVehicleStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let ledger = VehicleLedger::new(store);
                ledger.record_violation(Some("MH12AA0001")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let v = store.find_by_plate("MH12AA0001").await.unwrap().unwrap();
        assert_eq!(v.total_violations, 20);
    }

    #[tokio::test]
    async fn test_blacklist_forces_and_clears() {
        let ledger = ledger();
        ledger.record_violation(Some("TN10ZZ0042")).await.unwrap();

        let v = ledger.set_blacklist("TN10ZZ0042", true).await.unwrap();
        assert!(v.blacklisted);
        assert_eq!(v.risk_level, RiskLevel::Critical);

        // Stays CRITICAL for further violations while blacklisted
        let v = ledger
            .record_violation(Some("TN10ZZ0042"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v.risk_level, RiskLevel::Critical);

        // Clearing re-derives from count (2 violations -> LOW)
        let v = ledger.set_blacklist("TN10ZZ0042", false).await.unwrap();
        assert!(!v.blacklisted);
        assert_eq!(v.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_blacklist_unknown_plate_is_not_found() {
        let ledger = ledger();
        let err = ledger.set_blacklist("GHOST", true).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::NotFound(_)));
    }
}
