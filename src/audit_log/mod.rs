//! Audit log - operator action trail
//!
//! Written on every privileged mutation (violation status transitions,
//! camera registration). Append-only.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

/// One recorded operator action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub operator_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(operator_id: &str, action: &str, entity: &str, entity_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operator_id: operator_id.to_string(),
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Audit trail persistence
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn record(&self, entry: &AuditLogEntry) -> Result<()>;

    async fn recent(&self, limit: u32) -> Result<Vec<AuditLogEntry>>;
}

#[derive(Clone)]
pub struct MySqlAuditLogStore {
    pool: MySqlPool,
}

impl MySqlAuditLogStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for MySqlAuditLogStore {
    async fn record(&self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, operator_id, action, entity, entity_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.operator_id)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, operator_id, action, entity, entity_id, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;
                Ok(AuditLogEntry {
                    id: row.try_get("id")?,
                    operator_id: row.try_get("operator_id")?,
                    action: row.try_get("action")?,
                    entity: row.try_get("entity")?,
                    entity_id: row.try_get("entity_id")?,
                    created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
                })
            })
            .collect()
    }
}

/// In-memory audit log for tests and development
#[derive(Default)]
pub struct MemoryAuditLogStore {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLogStore for MemoryAuditLogStore {
    async fn record(&self, entry: &AuditLogEntry) -> Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.lock().await;
        let mut recent: Vec<AuditLogEntry> = entries.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}
