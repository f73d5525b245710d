use crate::models::recurrence::Recurrence;
use serde::{Deserialize, Serialize};

/// Spending limit for one category within one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRule {
    pub id: String,
    pub scenario_id: String,
    pub category_id: String,
    pub amount_cents: i64,
    pub recurrence: Recurrence,
}
