use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Annual rate (percent) in force from `effective_from` until the next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStep {
    pub effective_from: NaiveDate,
    pub annual_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsGoal {
    pub id: String,
    pub name: String,
    pub target_amount_cents: i64,
    pub deadline: Option<NaiveDate>,
    pub annual_interest_rate: Option<Decimal>,
    pub interest_rate_schedule: Vec<RateStep>,
    pub is_emergency_fund: bool,
}

impl SavingsGoal {
    /// Annual rate in percent applying on `date`.
    pub fn rate_on(&self, date: NaiveDate) -> Decimal {
        self.interest_rate_schedule
            .iter()
            .filter(|step| step.effective_from <= date)
            .max_by_key(|step| step.effective_from)
            .map(|step| step.annual_rate)
            .or(self.annual_interest_rate)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Declared balance of a savings goal on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsAnchor {
    pub id: String,
    pub savings_goal_id: String,
    pub date: NaiveDate,
    pub balance_cents: i64,
}
