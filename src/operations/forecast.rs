//! Recurring and one-off projected transactions, and the month-by-month cash
//! flow they produce.

use crate::db::forecast_repository;
use crate::error::{AppError, AppResult};
use crate::models::forecast::{ForecastEvent, ForecastRule};
use crate::models::recurrence::Recurrence;
use crate::models::transaction::TransactionType;
use crate::money::parse_cents;
use crate::operations::add::{check_amount_for_type, check_description, resolve_links};
use crate::operations::recurrence::occurrences_between;
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ForecastRuleForm {
    pub description: String,
    pub amount: String,
    pub transaction_type: String,
    pub recurrence: Recurrence,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub category: Option<String>,
    pub savings_goal: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForecastEventForm {
    pub description: String,
    pub amount: String,
    pub transaction_type: String,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub savings_goal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionSource {
    Rule(String),
    Event(String),
}

/// One dated entry of a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedItem {
    pub date: NaiveDate,
    pub description: String,
    pub transaction_type: TransactionType,
    pub amount_cents: i64,
    pub category_id: Option<String>,
    pub savings_goal_id: Option<String>,
    pub source: ProjectionSource,
}

impl ProjectedItem {
    pub fn signed_amount(&self) -> i64 {
        self.transaction_type.balance_sign() * self.amount_cents
    }
}

/// Totals for one calendar month. `month` is the first day of the month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthFlow {
    pub month: NaiveDate,
    pub income_cents: i64,
    pub expense_cents: i64,
    pub savings_cents: i64,
    pub net_cents: i64,
    pub closing_cents: i64,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_typed_amount(amount: &str, transaction_type: &str) -> AppResult<(TransactionType, i64)> {
    let transaction_type: TransactionType = transaction_type.parse()?;
    let amount_cents = parse_cents(amount)?;
    check_amount_for_type(transaction_type, amount_cents)?;
    Ok((transaction_type, amount_cents))
}

pub fn add_rule(conn: &Connection, scenario_id: &str, form: &ForecastRuleForm) -> AppResult<ForecastRule> {
    let description = check_description(&form.description)?;
    let (transaction_type, amount_cents) = parse_typed_amount(&form.amount, &form.transaction_type)?;
    form.recurrence.validate()?;
    if form.ends_on.is_some_and(|end| end < form.starts_on) {
        return Err(AppError::validation("End date must not be before the start date"));
    }
    let (category_id, savings_goal_id) = resolve_links(
        conn,
        transaction_type,
        trimmed(&form.category),
        trimmed(&form.savings_goal),
    )?;

    let rule = ForecastRule {
        id: Uuid::new_v4().to_string(),
        scenario_id: scenario_id.to_string(),
        transaction_type,
        description,
        amount_cents,
        recurrence: form.recurrence.clone(),
        starts_on: form.starts_on,
        ends_on: form.ends_on,
        category_id,
        savings_goal_id,
    };
    forecast_repository::add_rule(conn, &rule)?;
    info!(id = %rule.id, scenario = %scenario_id, "forecast rule added");
    Ok(rule)
}

pub fn list_rules(conn: &Connection, scenario_id: &str) -> AppResult<Vec<ForecastRule>> {
    forecast_repository::get_rules_for_scenario(conn, scenario_id)
}

pub fn remove_rule(conn: &Connection, id: &str) -> AppResult<()> {
    forecast_repository::remove_rule(conn, id.trim())?;
    info!(id = %id.trim(), "forecast rule removed");
    Ok(())
}

pub fn add_event(conn: &Connection, scenario_id: &str, form: &ForecastEventForm) -> AppResult<ForecastEvent> {
    let description = check_description(&form.description)?;
    let (transaction_type, amount_cents) = parse_typed_amount(&form.amount, &form.transaction_type)?;
    let (category_id, savings_goal_id) = resolve_links(
        conn,
        transaction_type,
        trimmed(&form.category),
        trimmed(&form.savings_goal),
    )?;

    let event = ForecastEvent {
        id: Uuid::new_v4().to_string(),
        scenario_id: scenario_id.to_string(),
        transaction_type,
        description,
        amount_cents,
        date: form.date,
        category_id,
        savings_goal_id,
    };
    forecast_repository::add_event(conn, &event)?;
    info!(id = %event.id, scenario = %scenario_id, "forecast event added");
    Ok(event)
}

pub fn list_events(conn: &Connection, scenario_id: &str) -> AppResult<Vec<ForecastEvent>> {
    forecast_repository::get_events_for_scenario(conn, scenario_id)
}

pub fn remove_event(conn: &Connection, id: &str) -> AppResult<()> {
    forecast_repository::remove_event(conn, id.trim())?;
    info!(id = %id.trim(), "forecast event removed");
    Ok(())
}

/// Expands rules and events over `[from, to]`. `amount_of` supplies the
/// amount used for each rule, so callers can project with overrides.
pub fn expand<F>(
    rules: &[ForecastRule],
    events: &[ForecastEvent],
    from: NaiveDate,
    to: NaiveDate,
    amount_of: F,
) -> AppResult<Vec<ProjectedItem>>
where
    F: Fn(&ForecastRule) -> i64,
{
    if from > to {
        return Err(AppError::validation("Start date must be before end date."));
    }

    let mut items = Vec::new();
    for rule in rules {
        let start = from.max(rule.starts_on);
        let end = rule.ends_on.map_or(to, |ends| ends.min(to));
        if start > end {
            continue;
        }
        let amount_cents = amount_of(rule);
        for date in occurrences_between(&rule.recurrence, start, end)? {
            items.push(ProjectedItem {
                date,
                description: rule.description.clone(),
                transaction_type: rule.transaction_type,
                amount_cents,
                category_id: rule.category_id.clone(),
                savings_goal_id: rule.savings_goal_id.clone(),
                source: ProjectionSource::Rule(rule.id.clone()),
            });
        }
    }
    for event in events.iter().filter(|e| e.date >= from && e.date <= to) {
        items.push(ProjectedItem {
            date: event.date,
            description: event.description.clone(),
            transaction_type: event.transaction_type,
            amount_cents: event.amount_cents,
            category_id: event.category_id.clone(),
            savings_goal_id: event.savings_goal_id.clone(),
            source: ProjectionSource::Event(event.id.clone()),
        });
    }
    // stable: same-day items keep rule order, then events
    items.sort_by_key(|item| item.date);
    Ok(items)
}

/// Every projected item of the scenario within `[from, to]`, ascending by date.
pub fn project(conn: &Connection, scenario_id: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<ProjectedItem>> {
    let rules = forecast_repository::get_rules_for_scenario(conn, scenario_id)?;
    let events = forecast_repository::get_events_for_scenario(conn, scenario_id)?;
    expand(&rules, &events, from, to, |rule| rule.amount_cents)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Buckets `(date, type, amount)` entries into calendar months covering
/// `[from, to]`, carrying a running closing balance from `opening_cents`.
/// Months without entries are still listed.
pub fn monthly_flows<I>(entries: I, from: NaiveDate, to: NaiveDate, opening_cents: i64) -> Vec<MonthFlow>
where
    I: IntoIterator<Item = (NaiveDate, TransactionType, i64)>,
{
    let mut flows = Vec::new();
    let mut cursor = Some(month_start(from));
    while let Some(month) = cursor.filter(|m| *m <= to) {
        flows.push(MonthFlow {
            month,
            income_cents: 0,
            expense_cents: 0,
            savings_cents: 0,
            net_cents: 0,
            closing_cents: 0,
        });
        cursor = next_month_start(month);
    }

    for (date, kind, amount) in entries {
        if date < from || date > to {
            continue;
        }
        let Some(flow) = flows.iter_mut().find(|f| f.month == month_start(date)) else {
            continue;
        };
        match kind {
            TransactionType::Income => flow.income_cents += amount,
            TransactionType::Expense => flow.expense_cents += amount,
            TransactionType::Savings => flow.savings_cents += amount,
            TransactionType::Adjustment => {}
        }
        flow.net_cents += kind.balance_sign() * amount;
    }

    let mut balance = opening_cents;
    for flow in &mut flows {
        balance += flow.net_cents;
        flow.closing_cents = balance;
    }
    flows
}

/// Per-month totals of the scenario's projection.
pub fn cash_flow_forecast(
    conn: &Connection,
    scenario_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    opening_cents: i64,
) -> AppResult<Vec<MonthFlow>> {
    let items = project(conn, scenario_id, from, to)?;
    Ok(monthly_flows(
        items.into_iter().map(|i| (i.date, i.transaction_type, i.amount_cents)),
        from,
        to,
        opening_cents,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::operations::categories::create_category;
    use crate::operations::scenarios::create_scenario;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule_form(description: &str, amount: &str, kind: &str, recurrence: Recurrence) -> ForecastRuleForm {
        ForecastRuleForm {
            description: description.to_string(),
            amount: amount.to_string(),
            transaction_type: kind.to_string(),
            recurrence,
            starts_on: date(2025, 1, 1),
            ends_on: None,
            category: None,
            savings_goal: None,
        }
    }

    fn setup() -> (Connection, String) {
        let conn = establish_test_connection().unwrap();
        let scenario = create_scenario(&conn, "Base").unwrap();
        create_category(&conn, "Rent").unwrap();
        (conn, scenario.id)
    }

    #[test]
    fn test_rule_validation_mirrors_transactions() {
        let (conn, scenario) = setup();
        let monthly = Recurrence::Monthly { day_of_month: 1 };

        let err = add_rule(&conn, &scenario, &rule_form("Rent", "1200", "expense", monthly.clone())).unwrap_err();
        assert!(err.to_string().contains("category"));

        let err = add_rule(&conn, &scenario, &rule_form("Pay", "-5", "income", monthly.clone())).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        let mut form = rule_form("Pay", "5", "income", monthly.clone());
        form.ends_on = Some(date(2024, 12, 1));
        assert!(add_rule(&conn, &scenario, &form).is_err());

        let mut rent = rule_form("Rent", "1200", "expense", monthly);
        rent.category = Some("rent".to_string());
        let rule = add_rule(&conn, &scenario, &rent).unwrap();
        assert_eq!(list_rules(&conn, &scenario).unwrap(), vec![rule]);
    }

    #[test]
    fn test_project_respects_rule_bounds_and_window() {
        let (conn, scenario) = setup();
        let mut pay = rule_form("Pay", "2000", "income", Recurrence::Monthly { day_of_month: 31 });
        pay.starts_on = date(2025, 2, 1);
        pay.ends_on = Some(date(2025, 4, 15));
        add_rule(&conn, &scenario, &pay).unwrap();
        add_event(
            &conn,
            &scenario,
            &ForecastEventForm {
                description: "Bonus".to_string(),
                amount: "500".to_string(),
                transaction_type: "income".to_string(),
                date: date(2025, 3, 10),
                category: None,
                savings_goal: None,
            },
        )
        .unwrap();

        let items = project(&conn, &scenario, date(2025, 1, 1), date(2025, 12, 31)).unwrap();
        let dates: Vec<NaiveDate> = items.iter().map(|i| i.date).collect();
        assert_eq!(dates, vec![date(2025, 2, 28), date(2025, 3, 10), date(2025, 3, 31)]);
        assert!(matches!(items[1].source, ProjectionSource::Event(_)));

        let narrow = project(&conn, &scenario, date(2025, 3, 1), date(2025, 3, 15)).unwrap();
        assert_eq!(narrow.len(), 1);
    }

    #[test]
    fn test_cash_flow_forecast_months() {
        let (conn, scenario) = setup();
        add_rule(
            &conn,
            &scenario,
            &rule_form("Pay", "1000", "income", Recurrence::Weekly { weekday: Weekday::Fri }),
        )
        .unwrap();
        let mut rent = rule_form("Rent", "1500", "expense", Recurrence::Monthly { day_of_month: 1 });
        rent.category = Some("Rent".to_string());
        add_rule(&conn, &scenario, &rent).unwrap();

        let flows = cash_flow_forecast(&conn, &scenario, date(2025, 1, 1), date(2025, 2, 28), 10_000).unwrap();
        assert_eq!(flows.len(), 2);
        // January 2025 has five Fridays, February four
        assert_eq!(flows[0].month, date(2025, 1, 1));
        assert_eq!(flows[0].income_cents, 500_000);
        assert_eq!(flows[0].expense_cents, 150_000);
        assert_eq!(flows[0].net_cents, 350_000);
        assert_eq!(flows[0].closing_cents, 360_000);
        assert_eq!(flows[1].income_cents, 400_000);
        assert_eq!(flows[1].closing_cents, 610_000);
    }

    #[test]
    fn test_monthly_flows_lists_empty_months_and_adjustments() {
        let entries = vec![
            (date(2025, 1, 5), TransactionType::Adjustment, -300),
            (date(2025, 3, 5), TransactionType::Savings, 1000),
        ];
        let flows = monthly_flows(entries, date(2025, 1, 15), date(2025, 3, 31), 0);
        assert_eq!(flows.len(), 3);
        // the adjustment falls before the window start
        assert_eq!(flows[0].net_cents, 0);
        assert_eq!(flows[1].net_cents, 0);
        assert_eq!(flows[2].savings_cents, 1000);
        assert_eq!(flows[2].closing_cents, -1000);
    }

    #[test]
    fn test_expand_uses_amount_override() {
        let rule = ForecastRule {
            id: "r".to_string(),
            scenario_id: "s".to_string(),
            transaction_type: TransactionType::Expense,
            description: "Gym".to_string(),
            amount_cents: 5000,
            recurrence: Recurrence::Monthly { day_of_month: 5 },
            starts_on: date(2025, 1, 1),
            ends_on: None,
            category_id: None,
            savings_goal_id: None,
        };
        let items = expand(&[rule], &[], date(2025, 1, 1), date(2025, 2, 28), |_| 7000).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.signed_amount() == -7000));
    }

    #[test]
    fn test_remove_rule_and_event() {
        let (conn, scenario) = setup();
        let rule = add_rule(
            &conn,
            &scenario,
            &rule_form("Pay", "10", "income", Recurrence::Monthly { day_of_month: 1 }),
        )
        .unwrap();
        remove_rule(&conn, &rule.id).unwrap();
        assert!(list_rules(&conn, &scenario).unwrap().is_empty());
        assert!(remove_rule(&conn, &rule.id).is_err());
        assert!(remove_event(&conn, "missing").is_err());
    }
}
