//! In-memory alert store for tests and development

use super::repository::AlertStore;
use super::types::{Alert, AlertStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<HashMap<String, Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create(&self, alert: &Alert) -> Result<()> {
        self.alerts
            .lock()
            .await
            .insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Alert>> {
        Ok(self.alerts.lock().await.get(id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<Alert>> {
        let alerts = self.alerts.lock().await;
        let mut open: Vec<Alert> = alerts
            .values()
            .filter(|a| matches!(a.status, AlertStatus::Active | AlertStatus::Acknowledged))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    async fn update_status(
        &self,
        id: &str,
        status: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let mut alerts = self.alerts.lock().await;
        let Some(alert) = alerts.get_mut(id) else {
            return Ok(None);
        };

        alert.status = status;
        match status {
            AlertStatus::Acknowledged => alert.acknowledged_at = Some(at),
            AlertStatus::Resolved => alert.resolved_at = Some(at),
            AlertStatus::Active => {}
        }
        Ok(Some(alert.clone()))
    }
}
