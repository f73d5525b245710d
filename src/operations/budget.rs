use crate::db::{budget_repository, category_repository, repository};
use crate::error::{AppError, AppResult};
use crate::models::budget::BudgetRule;
use crate::models::recurrence::{Cadence, Recurrence};
use crate::money::{parse_cents, percent_of};
use crate::operations::add::resolve_active_category;
use crate::operations::categories::find_category;
use crate::operations::recurrence::{monthly_equivalent_cents, period_containing};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::fmt;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_NEAR_LIMIT_PERCENT: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Under,
    Near,
    Over,
}

impl BudgetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetStatus::Under => "under",
            BudgetStatus::Near => "near",
            BudgetStatus::Over => "over",
        }
    }

    fn classify(spent_cents: i64, limit_cents: i64, percent_used: Decimal, near_limit_percent: u8) -> Self {
        if spent_cents > limit_cents {
            BudgetStatus::Over
        } else if percent_used >= Decimal::from(near_limit_percent) {
            BudgetStatus::Near
        } else {
            BudgetStatus::Under
        }
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetHealth {
    pub rule: BudgetRule,
    pub category_name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub spent_cents: i64,
    pub remaining_cents: i64,
    pub percent_used: Decimal,
    pub status: BudgetStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLine {
    pub category_name: String,
    pub cadence: Cadence,
    pub amount_cents: i64,
    pub monthly_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonthlyPlan {
    pub lines: Vec<PlanLine>,
    pub total_monthly_cents: i64,
}

fn parse_limit(amount_str: &str) -> AppResult<i64> {
    let cents = parse_cents(amount_str)
        .map_err(|e| AppError::validation(format!("Invalid budget amount '{}'. {}", amount_str.trim(), e)))?;
    if cents <= 0 {
        return Err(AppError::validation("Budget amount must be greater than zero"));
    }
    Ok(cents)
}

/// Sets the limit for a category in a scenario, replacing any existing one.
pub fn set_budget(
    conn: &Connection,
    scenario_id: &str,
    category: &str,
    amount_str: &str,
    recurrence: Recurrence,
) -> AppResult<BudgetRule> {
    if category.trim().is_empty() {
        return Err(AppError::validation("Category cannot be empty"));
    }
    let amount_cents = parse_limit(amount_str)?;
    recurrence.validate()?;
    let category_id = resolve_active_category(conn, category.trim())?;

    let rule = BudgetRule {
        id: Uuid::new_v4().to_string(),
        scenario_id: scenario_id.to_string(),
        category_id: category_id.clone(),
        amount_cents,
        recurrence,
    };
    budget_repository::set_budget(conn, &rule)?;
    info!(scenario = %scenario_id, category = %category_id, amount_cents, "budget set");

    budget_repository::get_budget(conn, scenario_id, &category_id)?
        .ok_or_else(|| AppError::not_found("Budget for category", category_id))
}

/// Raises a limit. A category without a limit starts from a monthly zero.
pub fn increase_budget(conn: &Connection, scenario_id: &str, category: &str, amount_str: &str) -> AppResult<BudgetRule> {
    let delta = parse_limit(amount_str)?;
    let category_id = resolve_active_category(conn, category.trim())?;
    match budget_repository::get_budget(conn, scenario_id, &category_id)? {
        Some(mut rule) => {
            rule.amount_cents += delta;
            budget_repository::update_amount(conn, &rule.id, rule.amount_cents)?;
            Ok(rule)
        }
        None => set_budget(
            conn,
            scenario_id,
            &category_id,
            &crate::money::format_cents(delta),
            Recurrence::Monthly { day_of_month: 1 },
        ),
    }
}

/// Lowers a limit. The result must stay above zero; remove the rule instead.
pub fn decrease_budget(conn: &Connection, scenario_id: &str, category: &str, amount_str: &str) -> AppResult<BudgetRule> {
    let delta = parse_limit(amount_str)?;
    let category = find_category(conn, category.trim())?;
    let mut rule = budget_repository::get_budget(conn, scenario_id, &category.id)?
        .ok_or_else(|| AppError::not_found("Budget for category", category.name.clone()))?;
    if rule.amount_cents - delta <= 0 {
        return Err(AppError::validation("Budget must stay above zero"));
    }
    rule.amount_cents -= delta;
    budget_repository::update_amount(conn, &rule.id, rule.amount_cents)?;
    Ok(rule)
}

pub fn list_budgets(conn: &Connection, scenario_id: &str) -> AppResult<Vec<BudgetRule>> {
    budget_repository::get_budgets_for_scenario(conn, scenario_id)
}

pub fn remove_budget(conn: &Connection, scenario_id: &str, category: &str) -> AppResult<()> {
    if category.trim().is_empty() {
        return Err(AppError::validation("Category cannot be empty"));
    }
    let category = find_category(conn, category.trim())?;
    budget_repository::delete_budget(conn, scenario_id, &category.id)?;
    info!(scenario = %scenario_id, category = %category.id, "budget removed");
    Ok(())
}

/// Spending against every limit of the scenario for the period containing
/// `today`. Archived categories are left out.
pub fn budget_health(
    conn: &Connection,
    scenario_id: &str,
    today: NaiveDate,
    near_limit_percent: u8,
) -> AppResult<Vec<BudgetHealth>> {
    let mut health = Vec::new();
    for rule in budget_repository::get_budgets_for_scenario(conn, scenario_id)? {
        let Some(category) = category_repository::get_category(conn, &rule.category_id)? else {
            continue;
        };
        if category.is_archived {
            continue;
        }

        let (period_start, period_end) = period_containing(&rule.recurrence, today)?;
        let spent_cents = repository::get_category_spend(conn, &rule.category_id, period_start, period_end)?;
        let percent_used = percent_of(spent_cents, rule.amount_cents);
        let status = BudgetStatus::classify(spent_cents, rule.amount_cents, percent_used, near_limit_percent);

        health.push(BudgetHealth {
            remaining_cents: rule.amount_cents - spent_cents,
            category_name: category.name,
            period_start,
            period_end,
            spent_cents,
            percent_used,
            status,
            rule,
        });
    }
    Ok(health)
}

pub fn monthly_plan(conn: &Connection, scenario_id: &str) -> AppResult<MonthlyPlan> {
    let mut plan = MonthlyPlan::default();
    for rule in budget_repository::get_budgets_for_scenario(conn, scenario_id)? {
        let Some(category) = category_repository::get_category(conn, &rule.category_id)? else {
            continue;
        };
        if category.is_archived {
            continue;
        }
        let cadence = rule.recurrence.cadence();
        let monthly_cents = monthly_equivalent_cents(cadence, rule.amount_cents);
        plan.total_monthly_cents += monthly_cents;
        plan.lines.push(PlanLine {
            category_name: category.name,
            cadence,
            amount_cents: rule.amount_cents,
            monthly_cents,
        });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::models::transaction::{Transaction, TransactionType};
    use crate::operations::categories::{archive_category, create_category};
    use crate::operations::scenarios::create_scenario;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Connection, String) {
        let conn = establish_test_connection().unwrap();
        let scenario = create_scenario(&conn, "Base").unwrap();
        create_category(&conn, "Food").unwrap();
        create_category(&conn, "Travel").unwrap();
        (conn, scenario.id)
    }

    fn monthly() -> Recurrence {
        Recurrence::Monthly { day_of_month: 1 }
    }

    fn spend(conn: &Connection, id: &str, day: NaiveDate, category: &str, cents: i64) {
        let category = find_category(conn, category).unwrap();
        let tx = Transaction::new(id.to_string(), day, id.to_string(), cents, TransactionType::Expense)
            .with_category(category.id);
        repository::add_transaction(conn, &tx).unwrap();
    }

    #[test]
    fn test_set_budget_success() {
        let (conn, scenario) = setup();
        let rule = set_budget(&conn, &scenario, "Food", "100.50", monthly()).unwrap();
        assert_eq!(rule.amount_cents, 10050);

        let budgets = list_budgets(&conn, &scenario).unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0].id, rule.id);
    }

    #[test]
    fn test_set_budget_twice_keeps_one_rule() {
        let (conn, scenario) = setup();
        let first = set_budget(&conn, &scenario, "Food", "100", monthly()).unwrap();
        let second = set_budget(&conn, &scenario, "food", "150", monthly()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.amount_cents, 15000);
        assert_eq!(list_budgets(&conn, &scenario).unwrap().len(), 1);
    }

    #[test]
    fn test_set_budget_invalid_amount() {
        let (conn, scenario) = setup();
        let err = set_budget(&conn, &scenario, "Food", "not-a-number", monthly()).unwrap_err();
        assert!(err.to_string().contains("Invalid budget amount"));
        assert!(set_budget(&conn, &scenario, "Food", "0", monthly()).is_err());
    }

    #[test]
    fn test_set_budget_empty_category() {
        let (conn, scenario) = setup();
        let err = set_budget(&conn, &scenario, "", "100", monthly()).unwrap_err();
        assert_eq!(err.to_string(), "Category cannot be empty");
    }

    #[test]
    fn test_set_budget_archived_category_rejected() {
        let (conn, scenario) = setup();
        archive_category(&conn, "Travel").unwrap();
        assert!(set_budget(&conn, &scenario, "Travel", "10", monthly()).is_err());
    }

    #[test]
    fn test_increase_budget_from_zero() {
        let (conn, scenario) = setup();
        let rule = increase_budget(&conn, &scenario, "Travel", "25.00").unwrap();
        assert_eq!(rule.amount_cents, 2500);
        assert_eq!(rule.recurrence, monthly());
    }

    #[test]
    fn test_increase_budget_existing() {
        let (conn, scenario) = setup();
        set_budget(&conn, &scenario, "Food", "10", monthly()).unwrap();
        increase_budget(&conn, &scenario, "Food", "5.25").unwrap();

        let budgets = list_budgets(&conn, &scenario).unwrap();
        assert_eq!(budgets[0].amount_cents, 1525);
    }

    #[test]
    fn test_decrease_budget_success() {
        let (conn, scenario) = setup();
        set_budget(&conn, &scenario, "Food", "20", monthly()).unwrap();
        decrease_budget(&conn, &scenario, "Food", "7.50").unwrap();

        let budgets = list_budgets(&conn, &scenario).unwrap();
        assert_eq!(budgets[0].amount_cents, 1250);
    }

    #[test]
    fn test_decrease_budget_below_zero_error() {
        let (conn, scenario) = setup();
        set_budget(&conn, &scenario, "Food", "5", monthly()).unwrap();
        let err = decrease_budget(&conn, &scenario, "Food", "10").unwrap_err();
        assert_eq!(err.to_string(), "Budget must stay above zero");
    }

    #[test]
    fn test_remove_budget() {
        let (conn, scenario) = setup();
        set_budget(&conn, &scenario, "Food", "10", monthly()).unwrap();
        remove_budget(&conn, &scenario, "Food").unwrap();
        assert!(list_budgets(&conn, &scenario).unwrap().is_empty());

        let err = remove_budget(&conn, &scenario, "Food").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_budget_health_statuses() {
        let (conn, scenario) = setup();
        create_category(&conn, "Fun").unwrap();
        set_budget(&conn, &scenario, "Food", "100", monthly()).unwrap();
        set_budget(&conn, &scenario, "Travel", "100", monthly()).unwrap();
        set_budget(&conn, &scenario, "Fun", "100", monthly()).unwrap();

        spend(&conn, "groceries", date(2025, 3, 3), "Food", 5000);
        spend(&conn, "last month", date(2025, 2, 27), "Food", 9000);
        spend(&conn, "train", date(2025, 3, 10), "Travel", 8000);
        spend(&conn, "concert", date(2025, 3, 12), "Fun", 10001);

        let health = budget_health(&conn, &scenario, date(2025, 3, 15), DEFAULT_NEAR_LIMIT_PERCENT).unwrap();
        let by_name = |name: &str| health.iter().find(|h| h.category_name == name).unwrap();

        let food = by_name("Food");
        assert_eq!((food.period_start, food.period_end), (date(2025, 3, 1), date(2025, 3, 31)));
        assert_eq!(food.spent_cents, 5000);
        assert_eq!(food.status, BudgetStatus::Under);
        assert_eq!(by_name("Travel").status, BudgetStatus::Near);
        let fun = by_name("Fun");
        assert_eq!(fun.status, BudgetStatus::Over);
        assert_eq!(fun.remaining_cents, -1);
    }

    #[test]
    fn test_budget_health_weekly_period_and_archived() {
        let (conn, scenario) = setup();
        set_budget(&conn, &scenario, "Food", "50", Recurrence::Weekly { weekday: Weekday::Mon }).unwrap();
        set_budget(&conn, &scenario, "Travel", "50", monthly()).unwrap();
        archive_category(&conn, "Travel").unwrap();

        // 2025-03-12 is a Wednesday
        let health = budget_health(&conn, &scenario, date(2025, 3, 12), 80).unwrap();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].period_start, date(2025, 3, 10));
        assert_eq!(health[0].period_end, date(2025, 3, 16));
    }

    #[test]
    fn test_budget_health_with_zero_limit_is_over_at_zero_percent() {
        let (conn, scenario) = setup();
        let food = find_category(&conn, "Food").unwrap();
        let rule = BudgetRule {
            id: Uuid::new_v4().to_string(),
            scenario_id: scenario.clone(),
            category_id: food.id,
            amount_cents: 0,
            recurrence: monthly(),
        };
        budget_repository::set_budget(&conn, &rule).unwrap();
        spend(&conn, "snack", date(2025, 3, 2), "Food", 300);

        let health = budget_health(&conn, &scenario, date(2025, 3, 15), DEFAULT_NEAR_LIMIT_PERCENT).unwrap();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].percent_used, Decimal::ZERO);
        assert_eq!(health[0].status, BudgetStatus::Over);
    }

    #[test]
    fn test_monthly_plan_totals() {
        let (conn, scenario) = setup();
        set_budget(&conn, &scenario, "Food", "100", Recurrence::Weekly { weekday: Weekday::Sat }).unwrap();
        set_budget(&conn, &scenario, "Travel", "1200", Recurrence::Yearly { month: 6, day_of_month: 1 }).unwrap();

        let plan = monthly_plan(&conn, &scenario).unwrap();
        assert_eq!(plan.lines.len(), 2);
        // 100 * 52 / 12 = 433.33
        assert_eq!(plan.lines[0].monthly_cents, 43333);
        assert_eq!(plan.lines[1].monthly_cents, 10000);
        assert_eq!(plan.total_monthly_cents, 53333);
    }
}
