use crate::db::{category_repository, repository};
use crate::error::{AppError, AppResult};
use crate::models::category::Category;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 50;

fn check_name(conn: &Connection, name: &str, except_id: Option<&str>) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Category cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation("Category too long"));
    }
    if let Some(existing) = category_repository::find_by_name(conn, name)? {
        if Some(existing.id.as_str()) != except_id {
            return Err(AppError::Conflict(format!(
                "Category '{}' already exists",
                existing.name
            )));
        }
    }
    Ok(name.to_string())
}

/// Looks a category up by id first, then by name.
pub fn find_category(conn: &Connection, name_or_id: &str) -> AppResult<Category> {
    if let Some(category) = category_repository::get_category(conn, name_or_id)? {
        return Ok(category);
    }
    category_repository::find_by_name(conn, name_or_id)?
        .ok_or_else(|| AppError::not_found("Category", name_or_id.trim()))
}

pub fn create_category(conn: &Connection, name: &str) -> AppResult<Category> {
    let name = check_name(conn, name, None)?;
    let category = Category {
        id: Uuid::new_v4().to_string(),
        name,
        is_archived: false,
    };
    category_repository::add_category(conn, &category)?;
    info!(id = %category.id, name = %category.name, "category created");
    Ok(category)
}

/// Returns the category with this name, creating it when missing.
pub fn get_or_create_category(conn: &Connection, name: &str) -> AppResult<Category> {
    match category_repository::find_by_name(conn, name)? {
        Some(category) => Ok(category),
        None => create_category(conn, name),
    }
}

pub fn rename_category(conn: &Connection, name_or_id: &str, new_name: &str) -> AppResult<Category> {
    let mut category = find_category(conn, name_or_id)?;
    let new_name = check_name(conn, new_name, Some(&category.id))?;
    category_repository::rename_category(conn, &category.id, &new_name)?;
    category.name = new_name;
    Ok(category)
}

pub fn archive_category(conn: &Connection, name_or_id: &str) -> AppResult<Category> {
    set_archived(conn, name_or_id, true)
}

pub fn unarchive_category(conn: &Connection, name_or_id: &str) -> AppResult<Category> {
    set_archived(conn, name_or_id, false)
}

fn set_archived(conn: &Connection, name_or_id: &str, archived: bool) -> AppResult<Category> {
    let mut category = find_category(conn, name_or_id)?;
    category_repository::set_archived(conn, &category.id, archived)?;
    category.is_archived = archived;
    info!(id = %category.id, archived, "category archive flag changed");
    Ok(category)
}

pub fn list_categories(conn: &Connection, include_archived: bool) -> AppResult<Vec<Category>> {
    category_repository::get_all_categories(conn, include_archived)
}

/// Deletes a category nothing refers to. Categories with history must be
/// archived instead.
pub fn delete_category(conn: &Connection, name_or_id: &str) -> AppResult<()> {
    let category = find_category(conn, name_or_id)?;
    let references = repository::count_for_category(conn, &category.id)?
        + category_repository::count_rule_references(conn, &category.id)?;
    if references > 0 {
        return Err(AppError::Conflict(format!(
            "Category '{}' is in use by {} record(s); archive it instead",
            category.name, references
        )));
    }
    category_repository::delete_category(conn, &category.id)?;
    info!(id = %category.id, "category deleted");
    Ok(())
}
