use crate::error::{AppError, AppResult};
use crate::models::category::Category;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        is_archived: row.get(2)?,
    })
}

pub fn add_category(conn: &Connection, category: &Category) -> AppResult<()> {
    conn.execute(
        "INSERT INTO categories (id, name, is_archived) VALUES (?1, ?2, ?3)",
        params![category.id, category.name, category.is_archived],
    )?;
    Ok(())
}

pub fn get_category(conn: &Connection, id: &str) -> AppResult<Option<Category>> {
    Ok(conn
        .query_row(
            "SELECT id, name, is_archived FROM categories WHERE id = ?1",
            [id],
            category_from_row,
        )
        .optional()?)
}

pub fn find_by_name(conn: &Connection, name: &str) -> AppResult<Option<Category>> {
    Ok(conn
        .query_row(
            "SELECT id, name, is_archived FROM categories WHERE LOWER(name) = LOWER(?1)",
            [name.trim()],
            category_from_row,
        )
        .optional()?)
}

pub fn get_all_categories(conn: &Connection, include_archived: bool) -> AppResult<Vec<Category>> {
    let sql = if include_archived {
        "SELECT id, name, is_archived FROM categories ORDER BY name COLLATE NOCASE ASC"
    } else {
        "SELECT id, name, is_archived FROM categories WHERE is_archived = 0 \
         ORDER BY name COLLATE NOCASE ASC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], category_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn rename_category(conn: &Connection, id: &str, name: &str) -> AppResult<()> {
    let rows = conn.execute("UPDATE categories SET name = ?2 WHERE id = ?1", params![id, name])?;
    if rows == 0 {
        return Err(AppError::not_found("Category", id));
    }
    Ok(())
}

pub fn set_archived(conn: &Connection, id: &str, archived: bool) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE categories SET is_archived = ?2 WHERE id = ?1",
        params![id, archived],
    )?;
    if rows == 0 {
        return Err(AppError::not_found("Category", id));
    }
    Ok(())
}

pub fn delete_category(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Category", id));
    }
    Ok(())
}

/// Number of budget rules, forecast rules/events and import rules that point
/// at the category.
pub fn count_rule_references(conn: &Connection, id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT (SELECT COUNT(*) FROM budget_rules WHERE category_id = ?1) \
              + (SELECT COUNT(*) FROM forecast_rules WHERE category_id = ?1) \
              + (SELECT COUNT(*) FROM forecast_events WHERE category_id = ?1) \
              + (SELECT COUNT(*) FROM category_rules WHERE category_id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}
