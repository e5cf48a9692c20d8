//! In-memory violation store for tests and development

use super::repository::ViolationStore;
use super::types::{EnrichedViolation, FineStatus, Violation, ViolationStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryViolationStore {
    violations: Mutex<HashMap<String, Violation>>,
    /// When set, attach_fine fails; exercises the partial-pipeline path
    fail_attach_fine: std::sync::atomic::AtomicBool,
}

impl MemoryViolationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_attach_fine(&self, fail: bool) {
        self.fail_attach_fine
            .store(fail, std::sync::atomic::Ordering::Relaxed);
    }
}

#[async_trait]
impl ViolationStore for MemoryViolationStore {
    async fn create(&self, violation: &Violation) -> Result<()> {
        self.violations
            .lock()
            .await
            .insert(violation.id.clone(), violation.clone());
        Ok(())
    }

    async fn attach_fine(&self, id: &str, amount: i64, at: DateTime<Utc>) -> Result<()> {
        if self
            .fail_attach_fine
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            return Err(crate::error::Error::Database(
                "simulated attach_fine failure".to_string(),
            ));
        }

        let mut violations = self.violations.lock().await;
        if let Some(v) = violations.get_mut(id) {
            v.fine_amount = Some(amount);
            v.fine_status = Some(FineStatus::Pending);
            v.fine_generated_at = Some(at);
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ViolationStatus,
        operator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Violation>> {
        let mut violations = self.violations.lock().await;
        let Some(v) = violations.get_mut(id) else {
            return Ok(None);
        };
        v.status = status;
        v.verified_by = Some(operator_id.to_string());
        v.verified_at = Some(at);
        Ok(Some(v.clone()))
    }

    async fn find(&self, id: &str) -> Result<Option<Violation>> {
        Ok(self.violations.lock().await.get(id).cloned())
    }

    async fn find_enriched(&self, id: &str) -> Result<Option<EnrichedViolation>> {
        Ok(self
            .violations
            .lock()
            .await
            .get(id)
            .map(|v| EnrichedViolation {
                violation: v.clone(),
                camera: None,
                vehicle: None,
            }))
    }

    async fn list(
        &self,
        status: Option<ViolationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Violation>, i64)> {
        let violations = self.violations.lock().await;
        let mut matching: Vec<Violation> = violations
            .values()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_by_plate(&self, plate_number: &str, limit: u32) -> Result<Vec<Violation>> {
        let violations = self.violations.lock().await;
        let mut matching: Vec<Violation> = violations
            .values()
            .filter(|v| v.plate_number.as_deref() == Some(plate_number))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn count_all(&self) -> Result<i64> {
        Ok(self.violations.lock().await.len() as i64)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .violations
            .lock()
            .await
            .values()
            .filter(|v| v.created_at >= since)
            .count() as i64)
    }

    async fn recent_confidences(&self, limit: u32) -> Result<Vec<f64>> {
        let violations = self.violations.lock().await;
        let mut all: Vec<&Violation> = violations.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .take(limit as usize)
            .map(|v| v.confidence_score)
            .collect())
    }
}
