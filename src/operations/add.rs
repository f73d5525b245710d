use crate::db::{category_repository, repository, savings_repository};
use crate::error::{AppError, AppResult};
use crate::models::transaction::{Transaction, TransactionType};
use crate::money::parse_cents;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

pub const MAX_DESCRIPTION_LEN: usize = 255;
pub const MAX_PAYMENT_METHOD_LEN: usize = 50;
pub const MAX_NOTES_LEN: usize = 1000;

/// Raw transaction input as typed by the user. Category and savings goal are
/// given by name (or id) and resolved against the store.
#[derive(Debug, Clone, Default)]
pub struct TransactionForm {
    pub date: String,
    pub description: String,
    pub amount: String,
    pub transaction_type: String,
    pub category: Option<String>,
    pub savings_goal: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

pub fn parse_date(input: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation("Invalid date format. Please use YYYY-MM-DD."))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Sign rules per type: adjustments are signed, everything else is positive.
pub fn check_amount_for_type(transaction_type: TransactionType, amount_cents: i64) -> AppResult<()> {
    match transaction_type {
        TransactionType::Adjustment if amount_cents == 0 => {
            Err(AppError::validation("Adjustment amount cannot be zero"))
        }
        TransactionType::Adjustment => Ok(()),
        _ if amount_cents <= 0 => Err(AppError::validation(format!(
            "Amount for {} must be greater than zero",
            transaction_type
        ))),
        _ => Ok(()),
    }
}

pub fn check_description(description: &str) -> AppResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::validation("Description is required"));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::validation("Description too long"));
    }
    Ok(description.to_string())
}

/// Resolves a category by name or id. Archived categories are rejected.
pub fn resolve_active_category(conn: &Connection, name_or_id: &str) -> AppResult<String> {
    let category = match category_repository::get_category(conn, name_or_id)? {
        Some(c) => c,
        None => category_repository::find_by_name(conn, name_or_id)?.ok_or_else(|| {
            AppError::validation(format!("Category '{}' does not exist", name_or_id))
        })?,
    };
    if category.is_archived {
        return Err(AppError::validation(format!(
            "Category '{}' is archived",
            category.name
        )));
    }
    Ok(category.id)
}

pub fn resolve_goal(conn: &Connection, name_or_id: &str) -> AppResult<String> {
    if let Some(goal) = savings_repository::get_goal(conn, name_or_id)? {
        return Ok(goal.id);
    }
    savings_repository::find_goal_by_name(conn, name_or_id)?
        .map(|g| g.id)
        .ok_or_else(|| AppError::validation(format!("Savings goal '{}' does not exist", name_or_id)))
}

/// Checks the category/goal requirements of a transaction type and returns
/// the resolved `(category_id, savings_goal_id)`.
pub fn resolve_links(
    conn: &Connection,
    transaction_type: TransactionType,
    category: Option<&str>,
    savings_goal: Option<&str>,
) -> AppResult<(Option<String>, Option<String>)> {
    let category_id = match (transaction_type, category) {
        (TransactionType::Expense, None) => {
            return Err(AppError::validation("Please select a category for this expense"));
        }
        (_, Some(name)) => Some(resolve_active_category(conn, name)?),
        (_, None) => None,
    };

    let savings_goal_id = match (transaction_type, savings_goal) {
        (TransactionType::Savings, None) => {
            return Err(AppError::validation(
                "Please select a savings goal for this savings transaction",
            ));
        }
        (TransactionType::Savings, Some(goal)) => Some(resolve_goal(conn, goal)?),
        (_, Some(_)) => {
            return Err(AppError::validation(
                "Only savings transactions can reference a savings goal",
            ));
        }
        (_, None) => None,
    };

    Ok((category_id, savings_goal_id))
}

/// Validates the form and builds a transaction with a fresh id.
pub fn create_transaction(conn: &Connection, form: &TransactionForm, today: NaiveDate) -> AppResult<Transaction> {
    let date = parse_date(&form.date)?;
    if date > today {
        return Err(AppError::validation(format!(
            "Transaction date {} is in the future",
            date
        )));
    }

    let description = check_description(&form.description)?;
    let amount_cents = parse_cents(&form.amount)?;
    let transaction_type: TransactionType = form.transaction_type.parse()?;
    check_amount_for_type(transaction_type, amount_cents)?;

    let payment_method = non_empty(&form.payment_method).map(str::to_string);
    if payment_method.as_ref().is_some_and(|p| p.chars().count() > MAX_PAYMENT_METHOD_LEN) {
        return Err(AppError::validation("Payment method too long"));
    }
    let notes = non_empty(&form.notes).map(str::to_string);
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(AppError::validation("Notes too long"));
    }

    let (category_id, savings_goal_id) = resolve_links(
        conn,
        transaction_type,
        non_empty(&form.category),
        non_empty(&form.savings_goal),
    )?;

    Ok(Transaction {
        id: Uuid::new_v4().to_string(),
        transaction_type,
        date,
        description,
        amount_cents,
        category_id,
        savings_goal_id,
        payment_method,
        notes,
    })
}

pub fn add_transaction_to_db(conn: &Connection, form: &TransactionForm, today: NaiveDate) -> AppResult<Transaction> {
    let transaction = create_transaction(conn, form, today)?;
    repository::add_transaction(conn, &transaction)?;
    info!(id = %transaction.id, kind = %transaction.transaction_type, "transaction added");
    Ok(transaction)
}

/// Replaces every field of an existing transaction with the validated form.
pub fn update_transaction_in_db(
    conn: &Connection,
    id: &str,
    form: &TransactionForm,
    today: NaiveDate,
) -> AppResult<Transaction> {
    if repository::get_transaction(conn, id)?.is_none() {
        return Err(AppError::not_found("Transaction", id));
    }
    let mut transaction = create_transaction(conn, form, today)?;
    transaction.id = id.to_string();
    repository::update_transaction(conn, &transaction)?;
    info!(id = %transaction.id, "transaction updated");
    Ok(transaction)
}

/// Parses the one-line format `date, description, amount, type, category`.
pub fn parse_transaction_line(input: &str) -> AppResult<TransactionForm> {
    let detail_parts: Vec<&str> = input.trim().split(',').map(|s| s.trim()).collect();
    if detail_parts.len() != 5 {
        return Err(AppError::validation(format!(
            "Invalid number of details provided. Expected 5 details separated by commas but got {}",
            detail_parts.len()
        )));
    }
    Ok(TransactionForm {
        date: detail_parts[0].to_string(),
        description: detail_parts[1].to_string(),
        amount: detail_parts[2].to_string(),
        transaction_type: detail_parts[3].to_string(),
        category: Some(detail_parts[4].to_string()),
        ..Default::default()
    })
}
