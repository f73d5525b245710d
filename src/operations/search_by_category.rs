use crate::db::{category_repository, repository};
use crate::error::{AppError, AppResult};
use crate::models::transaction::Transaction;
use rusqlite::Connection;

/// Transactions filed under the named category, archived ones included.
pub fn search_transactions_by_category_db(conn: &Connection, category: &str) -> AppResult<Vec<Transaction>> {
    let category = category.trim();
    if category.is_empty() {
        return Err(AppError::validation("Category cannot be empty"));
    }
    if category_repository::find_by_name(conn, category)?.is_none() {
        return Err(AppError::validation(format!("Category '{}' does not exist", category)));
    }
    repository::search_by_category(conn, category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::models::category::Category;
    use crate::models::transaction::TransactionType;
    use chrono::NaiveDate;

    fn create_test_transaction(id: &str, category_id: &str) -> Transaction {
        Transaction::new(
            id.to_string(),
            NaiveDate::from_ymd_opt(2025, 11, 9).expect("Invalid date"),
            "Test Description".to_string(),
            10050,
            TransactionType::Expense,
        )
        .with_category(category_id)
    }

    #[test]
    fn test_search_db_includes_archived_category() {
        let conn = establish_test_connection().unwrap();
        category_repository::add_category(
            &conn,
            &Category {
                id: "gym".to_string(),
                name: "Gym".to_string(),
                is_archived: true,
            },
        )
        .unwrap();
        repository::add_transaction(&conn, &create_test_transaction("1", "gym")).unwrap();

        let found = search_transactions_by_category_db(&conn, "gym").unwrap();
        assert_eq!(found.len(), 1);
        assert!(search_transactions_by_category_db(&conn, "Nothing").is_err());
    }
}
