//! In-memory vehicle store for tests and development
//!
//! A single mutex over the map serializes all read-modify-write sequences,
//! matching the row-lock guarantee of the MySQL implementation.

use super::repository::VehicleStore;
use super::types::{RiskLevel, Vehicle};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryVehicleStore {
    vehicles: Mutex<HashMap<String, Vehicle>>,
}

impl MemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleStore for MemoryVehicleStore {
    async fn find_by_plate(&self, plate_number: &str) -> Result<Option<Vehicle>> {
        Ok(self.vehicles.lock().await.get(plate_number).cloned())
    }

    async fn record_violation(&self, plate_number: &str, now: DateTime<Utc>) -> Result<Vehicle> {
        let mut vehicles = self.vehicles.lock().await;

        let vehicle = match vehicles.get(plate_number) {
            Some(current) => {
                let new_count = current.total_violations + 1;
                Vehicle {
                    total_violations: new_count,
                    risk_level: RiskLevel::derive(new_count, current.blacklisted),
                    last_violation_at: Some(now),
                    ..current.clone()
                }
            }
            None => Vehicle {
                plate_number: plate_number.to_string(),
                total_violations: 1,
                risk_level: RiskLevel::Low,
                blacklisted: false,
                last_violation_at: Some(now),
                created_at: now,
            },
        };

        vehicles.insert(plate_number.to_string(), vehicle.clone());
        Ok(vehicle)
    }

    async fn set_blacklist(&self, plate_number: &str, blacklisted: bool) -> Result<Option<Vehicle>> {
        let mut vehicles = self.vehicles.lock().await;

        let Some(current) = vehicles.get(plate_number) else {
            return Ok(None);
        };

        let updated = Vehicle {
            blacklisted,
            risk_level: RiskLevel::derive(current.total_violations, blacklisted),
            ..current.clone()
        };
        vehicles.insert(plate_number.to_string(), updated.clone());
        Ok(Some(updated))
    }
}
