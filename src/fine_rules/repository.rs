//! Fine rule repository (MySQL)

use super::{FineRule, FineRuleStore};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::Row;

/// MySQL-backed fine rule lookup. Rules are seeded/administered out of band
/// and read-only from the pipeline's perspective.
#[derive(Clone)]
pub struct MySqlFineRuleStore {
    pool: MySqlPool,
}

impl MySqlFineRuleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FineRuleStore for MySqlFineRuleStore {
    async fn find_by_type(&self, violation_type: &str) -> Result<Option<FineRule>> {
        let row = sqlx::query(
            r#"
            SELECT violation_type, base_amount, repeat_multiplier
            FROM violation_fine_rules
            WHERE violation_type = ?
            "#,
        )
        .bind(violation_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(FineRule {
                violation_type: row.try_get("violation_type")?,
                base_amount: row.try_get("base_amount")?,
                repeat_multiplier: row.try_get("repeat_multiplier")?,
            })
        })
        .transpose()
    }
}
