use crate::error::{AppError, AppResult};
use crate::models::transaction::{Transaction, TransactionType};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

const COLUMNS: &str = "t.id, t.transaction_type, t.date, t.description, t.amount_cents, \
     t.category_id, t.savings_goal_id, t.payment_method, t.notes";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        transaction_type: row.get(1)?,
        date: row.get(2)?,
        description: row.get(3)?,
        amount_cents: row.get(4)?,
        category_id: row.get(5)?,
        savings_goal_id: row.get(6)?,
        payment_method: row.get(7)?,
        notes: row.get(8)?,
    })
}

/// Optional constraints for [`list_transactions`]. Dates are inclusive.
#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub category_id: Option<String>,
    pub savings_goal_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub fn add_transaction(conn: &Connection, transaction: &Transaction) -> AppResult<()> {
    conn.execute(
        "INSERT INTO transactions (id, transaction_type, date, description, amount_cents, \
         category_id, savings_goal_id, payment_method, notes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            transaction.id,
            transaction.transaction_type,
            transaction.date,
            transaction.description,
            transaction.amount_cents,
            transaction.category_id,
            transaction.savings_goal_id,
            transaction.payment_method,
            transaction.notes,
        ],
    )?;
    Ok(())
}

pub fn update_transaction(conn: &Connection, transaction: &Transaction) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE transactions SET transaction_type = ?2, date = ?3, description = ?4, \
         amount_cents = ?5, category_id = ?6, savings_goal_id = ?7, payment_method = ?8, notes = ?9 \
         WHERE id = ?1",
        params![
            transaction.id,
            transaction.transaction_type,
            transaction.date,
            transaction.description,
            transaction.amount_cents,
            transaction.category_id,
            transaction.savings_goal_id,
            transaction.payment_method,
            transaction.notes,
        ],
    )?;
    if rows == 0 {
        return Err(AppError::not_found("Transaction", &transaction.id));
    }
    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> AppResult<Option<Transaction>> {
    let sql = format!("SELECT {} FROM transactions t WHERE t.id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, [id], transaction_from_row).optional()?)
}

pub fn get_all_transactions(conn: &Connection) -> AppResult<Vec<Transaction>> {
    list_transactions(conn, &TransactionFilter::default())
}

/// Transactions matching `filter`, newest first.
pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> AppResult<Vec<Transaction>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(kind) = filter.transaction_type {
        clauses.push("t.transaction_type = ?");
        values.push(Value::Text(kind.as_str().to_string()));
    }
    if let Some(ref category_id) = filter.category_id {
        clauses.push("t.category_id = ?");
        values.push(Value::Text(category_id.clone()));
    }
    if let Some(ref goal_id) = filter.savings_goal_id {
        clauses.push("t.savings_goal_id = ?");
        values.push(Value::Text(goal_id.clone()));
    }
    if let Some(from) = filter.from {
        clauses.push("t.date >= ?");
        values.push(Value::Text(from.to_string()));
    }
    if let Some(to) = filter.to {
        clauses.push("t.date <= ?");
        values.push(Value::Text(to.to_string()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM transactions t {} ORDER BY t.date DESC, t.rowid DESC",
        COLUMNS, where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), transaction_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Transactions with `after < date <= until` in ledger order (date, then
/// insertion). `after = None` means from the beginning.
pub fn get_ledger(
    conn: &Connection,
    after: Option<NaiveDate>,
    until: NaiveDate,
) -> AppResult<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions t \
         WHERE (?1 IS NULL OR t.date > ?1) AND t.date <= ?2 \
         ORDER BY t.date ASC, t.rowid ASC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![after, until], transaction_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_transactions_in_range(
    conn: &Connection,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> AppResult<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions t WHERE t.date >= ?1 AND t.date <= ?2 \
         ORDER BY t.date ASC, t.rowid ASC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![start_date, end_date], transaction_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_expense_transactions_in_range(
    conn: &Connection,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> AppResult<Vec<Transaction>> {
    Ok(get_transactions_in_range(conn, start_date, end_date)?
        .into_iter()
        .filter(|t| t.transaction_type == TransactionType::Expense)
        .collect())
}

/// Total expense spend for a category within an inclusive window.
pub fn get_category_spend(
    conn: &Connection,
    category_id: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> AppResult<i64> {
    let total: i64 = conn.query_row(
        "SELECT IFNULL(SUM(amount_cents), 0) FROM transactions \
         WHERE category_id = ?1 AND transaction_type = 'expense' AND date >= ?2 AND date <= ?3",
        params![category_id, start_date, end_date],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub fn remove_transaction(conn: &Connection, id: &str) -> AppResult<()> {
    let rows_affected = conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    if rows_affected == 0 {
        return Err(AppError::not_found("Transaction", id));
    }
    Ok(())
}

pub fn search_by_category(conn: &Connection, category: &str) -> AppResult<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions t JOIN categories c ON c.id = t.category_id \
         WHERE LOWER(c.name) = LOWER(?1) ORDER BY t.date DESC, t.rowid DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([category], transaction_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// True when a transaction with the same date, description, amount and type
/// is already stored.
pub fn is_duplicate(conn: &Connection, transaction: &Transaction) -> AppResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions \
         WHERE date = ?1 AND description = ?2 AND amount_cents = ?3 AND transaction_type = ?4",
        params![
            transaction.date,
            transaction.description,
            transaction.amount_cents,
            transaction.transaction_type,
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_for_category(conn: &Connection, category_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE category_id = ?1",
        [category_id],
        |row| row.get(0),
    )?)
}

pub fn count_for_goal(conn: &Connection, goal_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE savings_goal_id = ?1",
        [goal_id],
        |row| row.get(0),
    )?)
}
