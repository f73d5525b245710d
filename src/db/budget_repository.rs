use crate::db::sql::{RecurrenceColumns, recurrence_from_row};
use crate::error::{AppError, AppResult};
use crate::models::budget::BudgetRule;
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str =
    "id, scenario_id, category_id, amount_cents, cadence, weekday, day_of_month, month, anchor_date";

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<BudgetRule> {
    Ok(BudgetRule {
        id: row.get(0)?,
        scenario_id: row.get(1)?,
        category_id: row.get(2)?,
        amount_cents: row.get(3)?,
        recurrence: recurrence_from_row(row, 4)?,
    })
}

/// Inserts the rule, or replaces amount and recurrence of the existing rule
/// for the same scenario and category (keeping its id).
pub fn set_budget(conn: &Connection, rule: &BudgetRule) -> AppResult<()> {
    let cols = RecurrenceColumns::from(&rule.recurrence);
    conn.execute(
        "INSERT INTO budget_rules (id, scenario_id, category_id, amount_cents, cadence, weekday, \
         day_of_month, month, anchor_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT(scenario_id, category_id) DO UPDATE SET amount_cents = excluded.amount_cents, \
         cadence = excluded.cadence, weekday = excluded.weekday, day_of_month = excluded.day_of_month, \
         month = excluded.month, anchor_date = excluded.anchor_date",
        params![
            rule.id,
            rule.scenario_id,
            rule.category_id,
            rule.amount_cents,
            cols.cadence,
            cols.weekday,
            cols.day_of_month,
            cols.month,
            cols.anchor_date,
        ],
    )?;
    Ok(())
}

pub fn get_budget(
    conn: &Connection,
    scenario_id: &str,
    category_id: &str,
) -> AppResult<Option<BudgetRule>> {
    let sql = format!(
        "SELECT {} FROM budget_rules WHERE scenario_id = ?1 AND category_id = ?2",
        COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![scenario_id, category_id], budget_from_row)
        .optional()?)
}

pub fn get_budget_by_id(conn: &Connection, id: &str) -> AppResult<Option<BudgetRule>> {
    let sql = format!("SELECT {} FROM budget_rules WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, [id], budget_from_row).optional()?)
}

pub fn get_budgets_for_scenario(conn: &Connection, scenario_id: &str) -> AppResult<Vec<BudgetRule>> {
    let sql = format!(
        "SELECT b.{} FROM budget_rules b JOIN categories c ON c.id = b.category_id \
         WHERE b.scenario_id = ?1 ORDER BY c.name COLLATE NOCASE ASC",
        COLUMNS.replace(", ", ", b.")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([scenario_id], budget_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_all_budgets(conn: &Connection) -> AppResult<Vec<BudgetRule>> {
    let sql = format!("SELECT {} FROM budget_rules ORDER BY scenario_id, category_id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], budget_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn update_amount(conn: &Connection, id: &str, amount_cents: i64) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE budget_rules SET amount_cents = ?2 WHERE id = ?1",
        params![id, amount_cents],
    )?;
    if rows == 0 {
        return Err(AppError::not_found("Budget rule", id));
    }
    Ok(())
}

pub fn delete_budget(conn: &Connection, scenario_id: &str, category_id: &str) -> AppResult<()> {
    let rows = conn.execute(
        "DELETE FROM budget_rules WHERE scenario_id = ?1 AND category_id = ?2",
        params![scenario_id, category_id],
    )?;
    if rows == 0 {
        return Err(AppError::not_found("Budget for category", category_id));
    }
    Ok(())
}
