//! Vehicle repository (MySQL)
//!
//! The read-modify-write on a plate's violation count runs inside a
//! transaction with `SELECT ... FOR UPDATE`, so concurrent detections for the
//! same plate serialize on the row lock instead of losing updates.

use super::types::{RiskLevel, Vehicle};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Vehicle persistence operations
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn find_by_plate(&self, plate_number: &str) -> Result<Option<Vehicle>>;

    /// Atomically read-or-create the vehicle, increment its count by exactly
    /// one and re-derive the risk tier. One call per real detection event.
    async fn record_violation(&self, plate_number: &str, now: DateTime<Utc>) -> Result<Vehicle>;

    /// Set or clear the blacklist flag; the tier is forced to CRITICAL while
    /// set and re-derived from the count when cleared.
    async fn set_blacklist(&self, plate_number: &str, blacklisted: bool) -> Result<Option<Vehicle>>;
}

#[derive(Clone)]
pub struct MySqlVehicleStore {
    pool: MySqlPool,
}

impl MySqlVehicleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_vehicle(row: MySqlRow) -> Result<Vehicle> {
        let risk: String = row.try_get("risk_level")?;
        let last_violation_at: Option<chrono::NaiveDateTime> = row.try_get("last_violation_at")?;
        let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;

        Ok(Vehicle {
            plate_number: row.try_get("plate_number")?,
            total_violations: row.try_get("total_violations")?,
            risk_level: RiskLevel::parse(&risk),
            blacklisted: row.try_get("blacklisted")?,
            last_violation_at: last_violation_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        })
    }

    const VEHICLE_COLUMNS: &'static str =
        "plate_number, total_violations, risk_level, blacklisted, last_violation_at, created_at";
}

#[async_trait]
impl VehicleStore for MySqlVehicleStore {
    async fn find_by_plate(&self, plate_number: &str) -> Result<Option<Vehicle>> {
        let query = format!(
            "SELECT {} FROM vehicles WHERE plate_number = ?",
            Self::VEHICLE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(plate_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_vehicle).transpose()
    }

    async fn record_violation(&self, plate_number: &str, now: DateTime<Utc>) -> Result<Vehicle> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "SELECT {} FROM vehicles WHERE plate_number = ? FOR UPDATE",
            Self::VEHICLE_COLUMNS
        );
        let existing = sqlx::query(&query)
            .bind(plate_number)
            .fetch_optional(&mut *tx)
            .await?;

        let vehicle = match existing {
            Some(row) => {
                let current = Self::row_to_vehicle(row)?;
                let new_count = current.total_violations + 1;
                let new_risk = RiskLevel::derive(new_count, current.blacklisted);

                sqlx::query(
                    r#"
                    UPDATE vehicles
                    SET total_violations = ?, risk_level = ?, last_violation_at = ?
                    WHERE plate_number = ?
                    "#,
                )
                .bind(new_count)
                .bind(new_risk.as_str())
                .bind(now)
                .bind(plate_number)
                .execute(&mut *tx)
                .await?;

                Vehicle {
                    total_violations: new_count,
                    risk_level: new_risk,
                    last_violation_at: Some(now),
                    ..current
                }
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO vehicles
                        (plate_number, total_violations, risk_level, blacklisted,
                         last_violation_at, created_at)
                    VALUES (?, 1, ?, FALSE, ?, ?)
                    "#,
                )
                .bind(plate_number)
                .bind(RiskLevel::Low.as_str())
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                Vehicle {
                    plate_number: plate_number.to_string(),
                    total_violations: 1,
                    risk_level: RiskLevel::Low,
                    blacklisted: false,
                    last_violation_at: Some(now),
                    created_at: now,
                }
            }
        };

        tx.commit().await?;
        Ok(vehicle)
    }

    async fn set_blacklist(&self, plate_number: &str, blacklisted: bool) -> Result<Option<Vehicle>> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "SELECT {} FROM vehicles WHERE plate_number = ? FOR UPDATE",
            Self::VEHICLE_COLUMNS
        );
        let Some(row) = sqlx::query(&query)
            .bind(plate_number)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let current = Self::row_to_vehicle(row)?;
        let new_risk = RiskLevel::derive(current.total_violations, blacklisted);

        sqlx::query(
            r#"
            UPDATE vehicles
            SET blacklisted = ?, risk_level = ?
            WHERE plate_number = ?
            "#,
        )
        .bind(blacklisted)
        .bind(new_risk.as_str())
        .bind(plate_number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Vehicle {
            blacklisted,
            risk_level: new_risk,
            ..current
        }))
    }
}
