use crate::error::{AppError, AppResult};
use crate::models::scenario::Scenario;
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, name, is_default, created_at";

fn scenario_from_row(row: &Row<'_>) -> rusqlite::Result<Scenario> {
    Ok(Scenario {
        id: row.get(0)?,
        name: row.get(1)?,
        is_default: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn add_scenario(conn: &Connection, scenario: &Scenario) -> AppResult<()> {
    conn.execute(
        "INSERT INTO scenarios (id, name, is_default, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![scenario.id, scenario.name, scenario.is_default, scenario.created_at],
    )?;
    Ok(())
}

pub fn get_scenario(conn: &Connection, id: &str) -> AppResult<Option<Scenario>> {
    let sql = format!("SELECT {} FROM scenarios WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, [id], scenario_from_row).optional()?)
}

pub fn find_by_name(conn: &Connection, name: &str) -> AppResult<Option<Scenario>> {
    let sql = format!("SELECT {} FROM scenarios WHERE LOWER(name) = LOWER(?1)", COLUMNS);
    Ok(conn.query_row(&sql, [name.trim()], scenario_from_row).optional()?)
}

pub fn get_default(conn: &Connection) -> AppResult<Option<Scenario>> {
    let sql = format!("SELECT {} FROM scenarios WHERE is_default = 1", COLUMNS);
    Ok(conn.query_row(&sql, [], scenario_from_row).optional()?)
}

pub fn get_all_scenarios(conn: &Connection) -> AppResult<Vec<Scenario>> {
    let sql = format!(
        "SELECT {} FROM scenarios ORDER BY is_default DESC, created_at ASC, name ASC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scenario_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn count_scenarios(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM scenarios", [], |row| row.get(0))?)
}

/// Makes `id` the only default scenario.
pub fn set_default(conn: &Connection, id: &str) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE scenarios SET is_default = 0 WHERE is_default = 1", [])?;
    let rows = tx.execute("UPDATE scenarios SET is_default = 1 WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Scenario", id));
    }
    tx.commit()?;
    Ok(())
}

pub fn rename_scenario(conn: &Connection, id: &str, name: &str) -> AppResult<()> {
    let rows = conn.execute("UPDATE scenarios SET name = ?2 WHERE id = ?1", params![id, name])?;
    if rows == 0 {
        return Err(AppError::not_found("Scenario", id));
    }
    Ok(())
}

pub fn delete_scenario(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM scenarios WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Scenario", id));
    }
    Ok(())
}
