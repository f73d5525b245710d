use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Declared balance of the spending account at the end of `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAnchor {
    pub id: String,
    pub date: NaiveDate,
    pub balance_cents: i64,
    pub note: Option<String>,
}
