use crate::models::recurrence::Recurrence;
use crate::models::transaction::TransactionType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A recurring projected transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRule {
    pub id: String,
    pub scenario_id: String,
    pub transaction_type: TransactionType,
    pub description: String,
    pub amount_cents: i64,
    pub recurrence: Recurrence,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub category_id: Option<String>,
    pub savings_goal_id: Option<String>,
}

/// A one-off projected transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastEvent {
    pub id: String,
    pub scenario_id: String,
    pub transaction_type: TransactionType,
    pub description: String,
    pub amount_cents: i64,
    pub date: NaiveDate,
    pub category_id: Option<String>,
    pub savings_goal_id: Option<String>,
}
