use crate::error::{AppError, AppResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Savings,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Savings => "savings",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Sign applied to a stored amount when it moves the spending balance.
    /// Adjustments carry their own sign.
    pub fn balance_sign(self) -> i64 {
        match self {
            TransactionType::Income | TransactionType::Adjustment => 1,
            TransactionType::Expense | TransactionType::Savings => -1,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            "savings" => Ok(TransactionType::Savings),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(AppError::validation(format!(
                "Invalid transaction type '{}'. Use 'income', 'expense', 'savings' or 'adjustment'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub transaction_type: TransactionType,
    pub date: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub category_id: Option<String>,
    pub savings_goal_id: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl Transaction {
    pub fn new(
        id: String,
        date: NaiveDate,
        description: String,
        amount_cents: i64,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            id,
            transaction_type,
            date,
            description,
            amount_cents,
            category_id: None,
            savings_goal_id: None,
            payment_method: None,
            notes: None,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_savings_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.savings_goal_id = Some(goal_id.into());
        self
    }

    /// Effect of this transaction on the spending balance.
    pub fn signed_amount(&self) -> i64 {
        self.amount_cents * self.transaction_type.balance_sign()
    }
}
