use crate::db::{budget_repository, forecast_repository, scenario_repository};
use crate::error::{AppError, AppResult};
use crate::models::budget::BudgetRule;
use crate::models::forecast::ForecastRule;
use crate::models::scenario::Scenario;
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 100;

fn check_name(conn: &Connection, name: &str, except_id: Option<&str>) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Scenario name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation("Scenario name too long"));
    }
    if let Some(existing) = scenario_repository::find_by_name(conn, name)? {
        if Some(existing.id.as_str()) != except_id {
            return Err(AppError::Conflict(format!(
                "Scenario '{}' already exists",
                existing.name
            )));
        }
    }
    Ok(name.to_string())
}

/// Looks a scenario up by id, then by name. `None` selects the default.
pub fn resolve_scenario(conn: &Connection, name_or_id: Option<&str>) -> AppResult<Scenario> {
    match name_or_id {
        Some(key) => match scenario_repository::get_scenario(conn, key)? {
            Some(scenario) => Ok(scenario),
            None => scenario_repository::find_by_name(conn, key)?
                .ok_or_else(|| AppError::not_found("Scenario", key.trim())),
        },
        None => scenario_repository::get_default(conn)?.ok_or_else(|| {
            AppError::validation("No scenario exists yet. Create one with `scenario create`")
        }),
    }
}

/// The first scenario ever created becomes the default.
pub fn create_scenario(conn: &Connection, name: &str) -> AppResult<Scenario> {
    let name = check_name(conn, name, None)?;
    let scenario = Scenario {
        id: Uuid::new_v4().to_string(),
        name,
        is_default: scenario_repository::count_scenarios(conn)? == 0,
        created_at: Utc::now().to_rfc3339(),
    };
    scenario_repository::add_scenario(conn, &scenario)?;
    info!(id = %scenario.id, name = %scenario.name, is_default = scenario.is_default, "scenario created");
    Ok(scenario)
}

pub fn list_scenarios(conn: &Connection) -> AppResult<Vec<Scenario>> {
    scenario_repository::get_all_scenarios(conn)
}

pub fn rename_scenario(conn: &Connection, name_or_id: &str, new_name: &str) -> AppResult<Scenario> {
    let mut scenario = resolve_scenario(conn, Some(name_or_id))?;
    let new_name = check_name(conn, new_name, Some(&scenario.id))?;
    scenario_repository::rename_scenario(conn, &scenario.id, &new_name)?;
    scenario.name = new_name;
    Ok(scenario)
}

pub fn set_default_scenario(conn: &Connection, name_or_id: &str) -> AppResult<Scenario> {
    let mut scenario = resolve_scenario(conn, Some(name_or_id))?;
    scenario_repository::set_default(conn, &scenario.id)?;
    scenario.is_default = true;
    info!(id = %scenario.id, "default scenario switched");
    Ok(scenario)
}

/// Copies a scenario with every budget rule, forecast rule and forecast event.
pub fn duplicate_scenario(conn: &Connection, name_or_id: &str, new_name: &str) -> AppResult<Scenario> {
    let source = resolve_scenario(conn, Some(name_or_id))?;
    copy_scenario(conn, &source, new_name, |rule| rule.amount_cents, |rule| rule.amount_cents)
}

/// Writes a new scenario holding copies of `source`'s rules and events in a
/// single transaction. The closures pick the amount stored for each rule.
pub fn copy_scenario<B, F>(
    conn: &Connection,
    source: &Scenario,
    new_name: &str,
    budget_amount: B,
    forecast_amount: F,
) -> AppResult<Scenario>
where
    B: Fn(&BudgetRule) -> i64,
    F: Fn(&ForecastRule) -> i64,
{
    let name = check_name(conn, new_name, None)?;
    let copy = Scenario {
        id: Uuid::new_v4().to_string(),
        name,
        is_default: false,
        created_at: Utc::now().to_rfc3339(),
    };

    let tx = conn.unchecked_transaction()?;
    scenario_repository::add_scenario(&tx, &copy)?;
    for mut rule in budget_repository::get_budgets_for_scenario(&tx, &source.id)? {
        rule.amount_cents = budget_amount(&rule);
        rule.id = Uuid::new_v4().to_string();
        rule.scenario_id = copy.id.clone();
        budget_repository::set_budget(&tx, &rule)?;
    }
    for mut rule in forecast_repository::get_rules_for_scenario(&tx, &source.id)? {
        rule.amount_cents = forecast_amount(&rule);
        rule.id = Uuid::new_v4().to_string();
        rule.scenario_id = copy.id.clone();
        forecast_repository::add_rule(&tx, &rule)?;
    }
    for mut event in forecast_repository::get_events_for_scenario(&tx, &source.id)? {
        event.id = Uuid::new_v4().to_string();
        event.scenario_id = copy.id.clone();
        forecast_repository::add_event(&tx, &event)?;
    }
    tx.commit()?;

    info!(from = %source.id, id = %copy.id, "scenario copied");
    Ok(copy)
}

/// Deletes a scenario and, by cascade, its rules. The default stays.
pub fn delete_scenario(conn: &Connection, name_or_id: &str) -> AppResult<()> {
    let scenario = resolve_scenario(conn, Some(name_or_id))?;
    if scenario.is_default {
        return Err(AppError::Conflict(
            "The default scenario cannot be deleted; make another scenario the default first".to_string(),
        ));
    }
    scenario_repository::delete_scenario(conn, &scenario.id)?;
    info!(id = %scenario.id, "scenario deleted");
    Ok(())
}
