//! Whole-store JSON backup and restore.

use crate::db::{
    anchor_repository, budget_repository, category_repository, forecast_repository, repository,
    rule_repository, savings_repository, scenario_repository,
};
use crate::error::{AppError, AppResult};
use crate::models::anchor::BalanceAnchor;
use crate::models::budget::BudgetRule;
use crate::models::category::Category;
use crate::models::forecast::{ForecastEvent, ForecastRule};
use crate::models::rule::CategoryRule;
use crate::models::savings::{SavingsAnchor, SavingsGoal};
use crate::models::scenario::Scenario;
use crate::models::transaction::{Transaction, TransactionType};
use crate::money::MAX_ABS_CENTS;
use crate::operations::add::{MAX_NOTES_LEN, MAX_PAYMENT_METHOD_LEN, check_amount_for_type, check_description};
use crate::operations::import::compile;
use crate::operations::savings::{GoalInput, check_goal_input};
use crate::operations::{categories, scenarios};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

pub const FORMAT_VERSION: u32 = 1;

/// Tables cleared before a restore, children first.
const CLEAR_ORDER: [&str; 11] = [
    "category_rules",
    "budget_rules",
    "forecast_events",
    "forecast_rules",
    "savings_anchors",
    "transactions",
    "savings_rate_steps",
    "savings_goals",
    "balance_anchors",
    "scenarios",
    "categories",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub format_version: u32,
    pub exported_at: String,
    pub categories: Vec<Category>,
    pub transactions: Vec<Transaction>,
    pub scenarios: Vec<Scenario>,
    pub budget_rules: Vec<BudgetRule>,
    pub forecast_rules: Vec<ForecastRule>,
    pub forecast_events: Vec<ForecastEvent>,
    pub savings_goals: Vec<SavingsGoal>,
    pub savings_anchors: Vec<SavingsAnchor>,
    pub balance_anchors: Vec<BalanceAnchor>,
    pub category_rules: Vec<CategoryRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub categories: usize,
    pub transactions: usize,
    pub scenarios: usize,
    pub goals: usize,
}

pub fn snapshot(conn: &Connection) -> AppResult<Backup> {
    let mut transactions = repository::get_all_transactions(conn)?;
    transactions.reverse();
    Ok(Backup {
        format_version: FORMAT_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        categories: category_repository::get_all_categories(conn, true)?,
        transactions,
        scenarios: scenario_repository::get_all_scenarios(conn)?,
        budget_rules: budget_repository::get_all_budgets(conn)?,
        forecast_rules: forecast_repository::get_all_rules(conn)?,
        forecast_events: forecast_repository::get_all_events(conn)?,
        savings_goals: savings_repository::get_all_goals(conn)?,
        savings_anchors: savings_repository::get_all_anchors(conn)?,
        balance_anchors: anchor_repository::get_all_anchors(conn)?,
        category_rules: rule_repository::get_all_rules(conn)?,
    })
}

pub fn export_json(conn: &Connection, path: &Path) -> AppResult<Backup> {
    let backup = snapshot(conn)?;
    fs::write(path, serde_json::to_string_pretty(&backup)?)?;
    info!(path = %path.display(), transactions = backup.transactions.len(), "backup exported");
    Ok(backup)
}

fn check_backup(backup: &Backup) -> AppResult<()> {
    if backup.format_version != FORMAT_VERSION {
        return Err(AppError::validation(format!(
            "Unsupported backup format version {} (expected {})",
            backup.format_version, FORMAT_VERSION
        )));
    }
    let defaults = backup.scenarios.iter().filter(|s| s.is_default).count();
    if !backup.scenarios.is_empty() && defaults != 1 {
        return Err(AppError::validation(format!(
            "Backup must mark exactly one default scenario, found {}",
            defaults
        )));
    }
    BackupIds::new(backup).check_records(backup)
}

/// Prefixes a record's validation failure with what and which record it was.
fn in_record<T>(kind: &str, id: &str, result: AppResult<T>) -> AppResult<T> {
    result.map_err(|e| AppError::validation(format!("Backup {} '{}': {}", kind, id, e)))
}

fn check_name(name: &str, max_len: usize) -> AppResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if name.chars().count() > max_len {
        return Err(AppError::validation("Name too long"));
    }
    Ok(())
}

fn check_optional_len(field: &str, value: &Option<String>, max_len: usize) -> AppResult<()> {
    match value {
        Some(text) if text.chars().count() > max_len => {
            Err(AppError::validation(format!("{} too long", field)))
        }
        _ => Ok(()),
    }
}

/// Ids present in a backup. Records may only point at ids of the same backup.
struct BackupIds<'a> {
    categories: HashSet<&'a str>,
    goals: HashSet<&'a str>,
    scenarios: HashSet<&'a str>,
}

impl<'a> BackupIds<'a> {
    fn new(backup: &'a Backup) -> Self {
        Self {
            categories: backup.categories.iter().map(|c| c.id.as_str()).collect(),
            goals: backup.savings_goals.iter().map(|g| g.id.as_str()).collect(),
            scenarios: backup.scenarios.iter().map(|s| s.id.as_str()).collect(),
        }
    }

    fn category(&self, id: &str) -> AppResult<()> {
        if !self.categories.contains(id) {
            return Err(AppError::validation(format!("Category '{}' is not in the backup", id)));
        }
        Ok(())
    }

    fn scenario(&self, id: &str) -> AppResult<()> {
        if !self.scenarios.contains(id) {
            return Err(AppError::validation(format!("Scenario '{}' is not in the backup", id)));
        }
        Ok(())
    }

    /// Same type, amount and link rules as a transaction typed in by hand.
    fn typed_amount(
        &self,
        transaction_type: TransactionType,
        amount_cents: i64,
        category_id: Option<&str>,
        savings_goal_id: Option<&str>,
    ) -> AppResult<()> {
        check_amount_for_type(transaction_type, amount_cents)?;
        if amount_cents.abs() > MAX_ABS_CENTS {
            return Err(AppError::validation("Amount is out of range"));
        }
        match (transaction_type, category_id) {
            (TransactionType::Expense, None) => {
                return Err(AppError::validation("Expense has no category"));
            }
            (_, Some(id)) => self.category(id)?,
            (_, None) => {}
        }
        match (transaction_type, savings_goal_id) {
            (TransactionType::Savings, None) => Err(AppError::validation("Savings transaction has no goal")),
            (TransactionType::Savings, Some(id)) if !self.goals.contains(id) => Err(AppError::validation(
                format!("Savings goal '{}' is not in the backup", id),
            )),
            (TransactionType::Savings, Some(_)) => Ok(()),
            (_, Some(_)) => Err(AppError::validation(
                "Only savings transactions can reference a savings goal",
            )),
            (_, None) => Ok(()),
        }
    }

    fn check_records(&self, backup: &Backup) -> AppResult<()> {
        for category in &backup.categories {
            in_record("category", &category.id, check_name(&category.name, categories::MAX_NAME_LEN))?;
        }
        for scenario in &backup.scenarios {
            in_record("scenario", &scenario.id, check_name(&scenario.name, scenarios::MAX_NAME_LEN))?;
        }
        for goal in &backup.savings_goals {
            let input = GoalInput {
                name: goal.name.clone(),
                target_amount_cents: goal.target_amount_cents,
                deadline: goal.deadline,
                annual_interest_rate: goal.annual_interest_rate,
                interest_rate_schedule: goal.interest_rate_schedule.clone(),
                is_emergency_fund: goal.is_emergency_fund,
            };
            in_record("savings goal", &goal.id, check_goal_input(&input).map(drop))?;
        }
        for tx in &backup.transactions {
            in_record("transaction", &tx.id, self.check_transaction(tx))?;
        }
        for rule in &backup.budget_rules {
            in_record("budget rule", &rule.id, self.check_budget(rule))?;
        }
        for rule in &backup.forecast_rules {
            in_record("forecast rule", &rule.id, self.check_forecast_rule(rule))?;
        }
        for event in &backup.forecast_events {
            let result = check_description(&event.description).and_then(|_| {
                self.scenario(&event.scenario_id)?;
                self.typed_amount(
                    event.transaction_type,
                    event.amount_cents,
                    event.category_id.as_deref(),
                    event.savings_goal_id.as_deref(),
                )
            });
            in_record("forecast event", &event.id, result)?;
        }
        for anchor in &backup.savings_anchors {
            let result = if anchor.balance_cents < 0 {
                Err(AppError::validation("Savings balance cannot be negative"))
            } else if !self.goals.contains(anchor.savings_goal_id.as_str()) {
                Err(AppError::validation(format!(
                    "Savings goal '{}' is not in the backup",
                    anchor.savings_goal_id
                )))
            } else {
                Ok(())
            };
            in_record("savings anchor", &anchor.id, result)?;
        }
        for rule in &backup.category_rules {
            let result = compile(&rule.pattern).and_then(|_| self.category(&rule.category_id));
            in_record("category rule", &rule.id.to_string(), result)?;
        }
        Ok(())
    }

    fn check_transaction(&self, tx: &Transaction) -> AppResult<()> {
        check_description(&tx.description)?;
        check_optional_len("Payment method", &tx.payment_method, MAX_PAYMENT_METHOD_LEN)?;
        check_optional_len("Notes", &tx.notes, MAX_NOTES_LEN)?;
        self.typed_amount(
            tx.transaction_type,
            tx.amount_cents,
            tx.category_id.as_deref(),
            tx.savings_goal_id.as_deref(),
        )
    }

    fn check_budget(&self, rule: &BudgetRule) -> AppResult<()> {
        if rule.amount_cents <= 0 {
            return Err(AppError::validation("Budget amount must be greater than zero"));
        }
        rule.recurrence.validate()?;
        self.scenario(&rule.scenario_id)?;
        self.category(&rule.category_id)
    }

    fn check_forecast_rule(&self, rule: &ForecastRule) -> AppResult<()> {
        check_description(&rule.description)?;
        rule.recurrence.validate()?;
        if rule.ends_on.is_some_and(|end| end < rule.starts_on) {
            return Err(AppError::validation("End date must not be before the start date"));
        }
        self.scenario(&rule.scenario_id)?;
        self.typed_amount(
            rule.transaction_type,
            rule.amount_cents,
            rule.category_id.as_deref(),
            rule.savings_goal_id.as_deref(),
        )
    }
}

/// Replaces everything in the store with the backup's contents.
pub fn restore(conn: &Connection, backup: &Backup) -> AppResult<RestoreSummary> {
    check_backup(backup)?;

    let tx = conn.unchecked_transaction()?;
    for table in CLEAR_ORDER {
        tx.execute(&format!("DELETE FROM {}", table), [])?;
    }
    for category in &backup.categories {
        category_repository::add_category(&tx, category)?;
    }
    for goal in &backup.savings_goals {
        savings_repository::insert_goal(&tx, goal)?;
    }
    for transaction in &backup.transactions {
        repository::add_transaction(&tx, transaction)?;
    }
    for scenario in &backup.scenarios {
        scenario_repository::add_scenario(&tx, scenario)?;
    }
    for rule in &backup.budget_rules {
        budget_repository::set_budget(&tx, rule)?;
    }
    for rule in &backup.forecast_rules {
        forecast_repository::add_rule(&tx, rule)?;
    }
    for event in &backup.forecast_events {
        forecast_repository::add_event(&tx, event)?;
    }
    for anchor in &backup.savings_anchors {
        savings_repository::set_anchor(&tx, anchor)?;
    }
    for anchor in &backup.balance_anchors {
        anchor_repository::set_anchor(&tx, anchor)?;
    }
    for rule in &backup.category_rules {
        rule_repository::insert_rule(&tx, rule)?;
    }
    tx.commit()?;

    Ok(RestoreSummary {
        categories: backup.categories.len(),
        transactions: backup.transactions.len(),
        scenarios: backup.scenarios.len(),
        goals: backup.savings_goals.len(),
    })
}

pub fn import_json(conn: &Connection, path: &Path) -> AppResult<RestoreSummary> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::validation(format!("Failed to open file '{}': {}", path.display(), e)))?;
    let backup: Backup = serde_json::from_str(&raw)?;
    let summary = restore(conn, &backup)?;
    info!(path = %path.display(), transactions = summary.transactions, "backup restored");
    Ok(summary)
}
