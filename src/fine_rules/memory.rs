//! In-memory fine rule store for tests and development

use super::{FineRule, FineRuleStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Exact-key lookup; the resolver layer handles case tolerance
#[derive(Default)]
pub struct MemoryFineRuleStore {
    rules: RwLock<HashMap<String, FineRule>>,
}

impl MemoryFineRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, rule: FineRule) {
        self.rules
            .write()
            .await
            .insert(rule.violation_type.clone(), rule);
    }

    /// Seed the standard rule set used across the pipeline tests
    pub async fn with_standard_rules() -> Self {
        let store = Self::new();
        for (kind, base, multiplier) in [
            ("NO_HELMET", 500, 1.5),
            ("RED_LIGHT", 1000, 2.0),
            ("WRONG_WAY", 1500, 2.5),
            ("TRIPLE_RIDING", 800, 1.5),
            ("OVERSPEED", 1200, 2.0),
        ] {
            store
                .insert(FineRule {
                    violation_type: kind.to_string(),
                    base_amount: base,
                    repeat_multiplier: Some(multiplier),
                })
                .await;
        }
        store
    }
}

#[async_trait]
impl FineRuleStore for MemoryFineRuleStore {
    async fn find_by_type(&self, violation_type: &str) -> Result<Option<FineRule>> {
        Ok(self.rules.read().await.get(violation_type).cloned())
    }
}
