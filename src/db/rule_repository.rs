use crate::error::{AppError, AppResult};
use crate::models::rule::CategoryRule;
use rusqlite::{Connection, params};

pub fn add_rule(conn: &Connection, pattern: &str, category_id: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO category_rules (pattern, category_id) VALUES (?1, ?2)",
        params![pattern, category_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Restores a rule with its original id (backup import).
pub fn insert_rule(conn: &Connection, rule: &CategoryRule) -> AppResult<()> {
    conn.execute(
        "INSERT INTO category_rules (id, pattern, category_id) VALUES (?1, ?2, ?3)",
        params![rule.id, rule.pattern, rule.category_id],
    )?;
    Ok(())
}

pub fn get_all_rules(conn: &Connection) -> AppResult<Vec<CategoryRule>> {
    let mut stmt = conn.prepare("SELECT id, pattern, category_id FROM category_rules ORDER BY id ASC")?;
    let rules_iter = stmt.query_map([], |row| {
        Ok(CategoryRule {
            id: row.get(0)?,
            pattern: row.get(1)?,
            category_id: row.get(2)?,
        })
    })?;
    Ok(rules_iter.collect::<Result<Vec<_>, _>>()?)
}

pub fn remove_rule(conn: &Connection, id: i64) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM category_rules WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Category rule", id.to_string()));
    }
    Ok(())
}
