//! Spending-account balance derived from declared anchors.
//!
//! An anchor states the balance at the end of its date, so transactions on
//! the anchor date are already inside it. The balance on any later day is the
//! anchor plus the signed amounts of the transactions after it.

use crate::db::{anchor_repository, repository};
use crate::error::{AppError, AppResult};
use crate::models::anchor::BalanceAnchor;
use crate::models::transaction::{Transaction, TransactionType};
use crate::money::format_cents;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub transaction: Transaction,
    pub balance_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub date: NaiveDate,
    pub computed_cents: i64,
    pub declared_cents: i64,
    pub difference_cents: i64,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.difference_cents == 0
    }
}

pub fn set_balance_anchor(
    conn: &Connection,
    date: NaiveDate,
    balance_cents: i64,
    note: Option<String>,
) -> AppResult<BalanceAnchor> {
    let anchor = BalanceAnchor {
        id: Uuid::new_v4().to_string(),
        date,
        balance_cents,
        note,
    };
    anchor_repository::set_anchor(conn, &anchor)?;
    info!(%date, balance = %format_cents(balance_cents), "balance anchor set");
    Ok(anchor)
}

pub fn list_anchors(conn: &Connection) -> AppResult<Vec<BalanceAnchor>> {
    anchor_repository::get_all_anchors(conn)
}

pub fn delete_anchor(conn: &Connection, id: &str) -> AppResult<()> {
    anchor_repository::delete_anchor(conn, id)
}

/// Sum of signed amounts, starting from `opening`.
pub fn sum_signed(opening: i64, transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .fold(opening, |acc, t| acc + t.signed_amount())
}

/// Balance at the end of `date`.
pub fn balance_on(conn: &Connection, date: NaiveDate) -> AppResult<i64> {
    let anchor = anchor_repository::latest_on_or_before(conn, date)?;
    let (after, opening) = match anchor {
        Some(ref a) => (Some(a.date), a.balance_cents),
        None => (None, 0),
    };
    let transactions = repository::get_ledger(conn, after, date)?;
    Ok(sum_signed(opening, &transactions))
}

/// Ledger rows for `[from, to]` with the balance after each transaction.
/// Anchors inside the window reset the running balance once every
/// transaction of their date has been applied.
pub fn running_balance(conn: &Connection, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<LedgerRow>> {
    if from > to {
        return Err(AppError::validation("Start date must be before end date."));
    }
    let mut balance = match from.pred_opt() {
        Some(day_before) => balance_on(conn, day_before)?,
        None => 0,
    };

    let transactions = repository::get_transactions_in_range(conn, from, to)?;
    let mut anchors = anchor_repository::get_in_range(conn, from, to)?.into_iter().peekable();

    let mut rows = Vec::with_capacity(transactions.len());
    for transaction in transactions {
        while let Some(anchor) = anchors.next_if(|a| a.date < transaction.date) {
            balance = anchor.balance_cents;
        }
        balance += transaction.signed_amount();
        rows.push(LedgerRow {
            transaction,
            balance_cents: balance,
        });
    }
    Ok(rows)
}

pub fn reconcile(conn: &Connection, date: NaiveDate, declared_cents: i64) -> AppResult<Reconciliation> {
    let computed_cents = balance_on(conn, date)?;
    Ok(Reconciliation {
        date,
        computed_cents,
        declared_cents,
        difference_cents: declared_cents - computed_cents,
    })
}

/// Books the reconciliation difference as an adjustment dated on the
/// reconciliation day. Nothing is written when the books already balance.
pub fn record_adjustment(conn: &Connection, reconciliation: &Reconciliation) -> AppResult<Option<Transaction>> {
    if reconciliation.is_balanced() {
        return Ok(None);
    }
    let mut adjustment = Transaction::new(
        Uuid::new_v4().to_string(),
        reconciliation.date,
        "Balance reconciliation".to_string(),
        reconciliation.difference_cents,
        TransactionType::Adjustment,
    );
    adjustment.notes = Some(format!(
        "Declared {} vs computed {}",
        format_cents(reconciliation.declared_cents),
        format_cents(reconciliation.computed_cents)
    ));
    repository::add_transaction(conn, &adjustment)?;
    info!(
        date = %reconciliation.date,
        difference = %format_cents(reconciliation.difference_cents),
        "reconciliation adjustment recorded"
    );
    Ok(Some(adjustment))
}
