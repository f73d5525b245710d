use crate::db::repository;
use crate::error::{AppError, AppResult};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

pub fn remove_transaction_from_db(conn: &Connection, id_input: &str) -> AppResult<()> {
    let id_input = id_input.trim();
    if id_input.is_empty() {
        return Err(AppError::validation("Transaction ID cannot be empty."));
    }

    let id = Uuid::parse_str(id_input).map_err(|_| {
        AppError::validation("Invalid transaction ID format. Please provide a valid UUID.")
    })?;

    repository::remove_transaction(conn, &id.to_string())?;
    info!(%id, "transaction removed");
    Ok(())
}
