//! Fine rules - per-violation-kind penalty policy
//!
//! ## Responsibilities
//!
//! - Resolve the fine rule for a violation kind (case-insensitive)
//! - Compute the fine amount with repeat-offender escalation
//!
//! A missing rule is a normal zero-fine case, not an error: new violation
//! kinds can reach the pipeline before their rule is seeded.

mod memory;
mod repository;

pub use memory::MemoryFineRuleStore;
pub use repository::MySqlFineRuleStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Violation count at which the repeat multiplier applies
pub const REPEAT_OFFENDER_THRESHOLD: i64 = 3;
/// Violation count at which the habitual surcharge applies
pub const HABITUAL_OFFENDER_THRESHOLD: i64 = 10;
/// Surcharge factor on top of the repeat multiplier for habitual offenders
pub const HABITUAL_SURCHARGE: f64 = 1.5;

/// Penalty policy for one violation kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineRule {
    pub violation_type: String,
    /// Base amount in whole currency units
    pub base_amount: i64,
    /// Escalation factor for repeat offenders; treated as 1.0 when unset
    pub repeat_multiplier: Option<f64>,
}

/// Fine rule lookup, keyed by violation kind
#[async_trait]
pub trait FineRuleStore: Send + Sync {
    async fn find_by_type(&self, violation_type: &str) -> Result<Option<FineRule>>;
}

/// Compute the fine for a violation kind given the vehicle's violation count.
///
/// Pure function, callable for audit/estimate purposes. Amounts are floored
/// by integer truncation.
pub fn calculate_fine(rule: Option<&FineRule>, vehicle_count: i64) -> i64 {
    let Some(rule) = rule else {
        return 0;
    };

    let multiplier = rule.repeat_multiplier.unwrap_or(1.0);

    if vehicle_count >= HABITUAL_OFFENDER_THRESHOLD {
        (rule.base_amount as f64 * multiplier * HABITUAL_SURCHARGE) as i64
    } else if vehicle_count >= REPEAT_OFFENDER_THRESHOLD {
        (rule.base_amount as f64 * multiplier) as i64
    } else {
        rule.base_amount
    }
}

/// Multiplier actually applied for a given count (for the audit breakdown)
pub fn applied_multiplier(rule: &FineRule, vehicle_count: i64) -> f64 {
    let multiplier = rule.repeat_multiplier.unwrap_or(1.0);

    if vehicle_count >= HABITUAL_OFFENDER_THRESHOLD {
        multiplier * HABITUAL_SURCHARGE
    } else if vehicle_count >= REPEAT_OFFENDER_THRESHOLD {
        multiplier
    } else {
        1.0
    }
}

/// Rule resolution front-end shared by the pipeline and the fine query
pub struct FineEngine {
    rules: Arc<dyn FineRuleStore>,
}

impl FineEngine {
    pub fn new(rules: Arc<dyn FineRuleStore>) -> Self {
        Self { rules }
    }

    /// Resolve the rule for a kind: exact match first, then uppercased, to
    /// tolerate mixed-case input from upstream detectors.
    pub async fn resolve(&self, violation_type: &str) -> Result<Option<FineRule>> {
        if let Some(rule) = self.rules.find_by_type(violation_type).await? {
            return Ok(Some(rule));
        }
        self.rules
            .find_by_type(&violation_type.to_uppercase())
            .await
    }

    /// Fine amount for a kind + vehicle count; 0 when no rule exists
    pub async fn calculate(&self, violation_type: &str, vehicle_count: i64) -> Result<i64> {
        let rule = self.resolve(violation_type).await?;
        Ok(calculate_fine(rule.as_ref(), vehicle_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(base: i64, multiplier: f64) -> FineRule {
        FineRule {
            violation_type: "NO_HELMET".to_string(),
            base_amount: base,
            repeat_multiplier: Some(multiplier),
        }
    }

    #[test]
    fn test_first_offense_is_base_amount() {
        assert_eq!(calculate_fine(Some(&rule(500, 1.5)), 0), 500);
        assert_eq!(calculate_fine(Some(&rule(500, 1.5)), 1), 500);
    }

    #[test]
    fn test_boundary_below_repeat_threshold() {
        assert_eq!(calculate_fine(Some(&rule(500, 1.5)), 2), 500);
    }

    #[test]
    fn test_repeat_offender_multiplier() {
        // floor(500 * 1.5) = 750
        assert_eq!(calculate_fine(Some(&rule(500, 1.5)), 3), 750);
        assert_eq!(calculate_fine(Some(&rule(500, 1.5)), 9), 750);
    }

    #[test]
    fn test_habitual_offender_surcharge() {
        // floor(500 * 1.5 * 1.5) = 1125
        assert_eq!(calculate_fine(Some(&rule(500, 1.5)), 10), 1125);
        // floor(1500 * 2.5 * 1.5) = 5625
        let wrong_way = FineRule {
            violation_type: "WRONG_WAY".to_string(),
            base_amount: 1500,
            repeat_multiplier: Some(2.5),
        };
        assert_eq!(calculate_fine(Some(&wrong_way), 11), 5625);
    }

    #[test]
    fn test_flooring_truncates() {
        // 333 * 1.1 = 366.3 -> 366
        assert_eq!(calculate_fine(Some(&rule(333, 1.1)), 3), 366);
    }

    #[test]
    fn test_missing_multiplier_defaults_to_one() {
        let r = FineRule {
            violation_type: "RED_LIGHT".to_string(),
            base_amount: 1000,
            repeat_multiplier: None,
        };
        assert_eq!(calculate_fine(Some(&r), 5), 1000);
        assert_eq!(calculate_fine(Some(&r), 12), 1500);
    }

    #[test]
    fn test_unknown_kind_is_zero() {
        assert_eq!(calculate_fine(None, 0), 0);
        assert_eq!(calculate_fine(None, 50), 0);
    }

    #[test]
    fn test_applied_multiplier_tiers() {
        let r = rule(500, 2.0);
        assert_eq!(applied_multiplier(&r, 0), 1.0);
        assert_eq!(applied_multiplier(&r, 3), 2.0);
        assert_eq!(applied_multiplier(&r, 10), 3.0);
    }

    #[tokio::test]
    async fn test_resolve_is_case_insensitive() {
        let store = Arc::new(MemoryFineRuleStore::new());
        store
            .insert(FineRule {
                violation_type: "RED_LIGHT".to_string(),
                base_amount: 1000,
                repeat_multiplier: Some(2.0),
            })
            .await;

        let engine = FineEngine::new(store);

        let exact = engine.resolve("RED_LIGHT").await.unwrap().unwrap();
        let lower = engine.resolve("red_light").await.unwrap().unwrap();
        assert_eq!(exact.base_amount, lower.base_amount);
        assert_eq!(exact.violation_type, lower.violation_type);
    }

    #[tokio::test]
    async fn test_calculate_without_rule_is_zero() {
        let engine = FineEngine::new(Arc::new(MemoryFineRuleStore::new()));
        assert_eq!(engine.calculate("JAYWALKING", 7).await.unwrap(), 0);
    }
}
