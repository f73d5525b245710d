//! Text reports over actual transactions, budgets and savings goals.

use crate::db::{category_repository, repository};
use crate::error::{AppError, AppResult};
use crate::models::transaction::Transaction;
use crate::money::format_money;
use crate::operations::balance::balance_on;
use crate::operations::budget::BudgetHealth;
use crate::operations::forecast::{MonthFlow, monthly_flows};
use crate::operations::import::UNCATEGORISED;
use crate::operations::savings::GoalProgress;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendingLine {
    pub category: String,
    pub total_cents: i64,
    pub share_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpendingBreakdown {
    pub lines: Vec<SpendingLine>,
    pub total_cents: i64,
}

fn check_window(from: NaiveDate, to: NaiveDate) -> AppResult<()> {
    if from > to {
        return Err(AppError::validation("Start date must be before end date."));
    }
    Ok(())
}

/// Category id to display name, archived categories included.
pub fn category_names(conn: &Connection) -> AppResult<HashMap<String, String>> {
    Ok(category_repository::get_all_categories(conn, true)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

pub fn category_label(names: &HashMap<String, String>, transaction: &Transaction) -> String {
    transaction
        .category_id
        .as_ref()
        .and_then(|id| names.get(id))
        .cloned()
        .unwrap_or_else(|| UNCATEGORISED.to_string())
}

/// Actual income, expense and savings per month, with the closing balance
/// carried from the balance at the end of the day before `from`.
pub fn cash_flow(conn: &Connection, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<MonthFlow>> {
    check_window(from, to)?;
    let opening = match from.pred_opt() {
        Some(day_before) => balance_on(conn, day_before)?,
        None => 0,
    };
    let transactions = repository::get_transactions_in_range(conn, from, to)?;
    Ok(monthly_flows(
        transactions
            .iter()
            .map(|t| (t.date, t.transaction_type, t.amount_cents)),
        from,
        to,
        opening,
    ))
}

/// Expense totals per category, largest first. Expenses without a category
/// are grouped together.
pub fn breakdown_of(transactions: &[Transaction], names: &HashMap<String, String>) -> SpendingBreakdown {
    let mut totals: HashMap<String, i64> = HashMap::new();
    for transaction in transactions {
        *totals.entry(category_label(names, transaction)).or_insert(0) += transaction.amount_cents;
    }
    let total_cents: i64 = totals.values().sum();

    let mut lines: Vec<SpendingLine> = totals
        .into_iter()
        .map(|(category, amount)| SpendingLine {
            share_percent: if total_cents == 0 {
                Decimal::ZERO
            } else {
                (Decimal::from(amount) * Decimal::ONE_HUNDRED / Decimal::from(total_cents)).round_dp(1)
            },
            category,
            total_cents: amount,
        })
        .collect();
    lines.sort_by(|a, b| b.total_cents.cmp(&a.total_cents).then_with(|| a.category.cmp(&b.category)));

    SpendingBreakdown { lines, total_cents }
}

pub fn spending_breakdown(conn: &Connection, from: NaiveDate, to: NaiveDate) -> AppResult<SpendingBreakdown> {
    check_window(from, to)?;
    let expenses = repository::get_expense_transactions_in_range(conn, from, to)?;
    Ok(breakdown_of(&expenses, &category_names(conn)?))
}

pub fn format_cash_flow(flows: &[MonthFlow], symbol: &str) -> String {
    let mut out = format!(
        "{:<8} {:>14} {:>14} {:>14} {:>14} {:>14}\n",
        "Month", "Income", "Expenses", "Savings", "Net", "Balance"
    );
    for flow in flows {
        let _ = writeln!(
            out,
            "{:<8} {:>14} {:>14} {:>14} {:>14} {:>14}",
            flow.month.format("%Y-%m"),
            format_money(flow.income_cents, symbol),
            format_money(flow.expense_cents, symbol),
            format_money(flow.savings_cents, symbol),
            format_money(flow.net_cents, symbol),
            format_money(flow.closing_cents, symbol),
        );
    }
    out
}

pub fn format_breakdown(breakdown: &SpendingBreakdown, symbol: &str) -> String {
    if breakdown.lines.is_empty() {
        return "No expenses in this range\n".to_string();
    }
    let mut out = String::new();
    for line in &breakdown.lines {
        let _ = writeln!(
            out,
            "{:<20} {:>14} {:>6}%",
            line.category,
            format_money(line.total_cents, symbol),
            line.share_percent
        );
    }
    let _ = writeln!(out, "{:<20} {:>14}", "Total", format_money(breakdown.total_cents, symbol));
    out
}

pub fn format_budget_health(health: &[BudgetHealth], symbol: &str) -> String {
    if health.is_empty() {
        return "No budgets set for this scenario\n".to_string();
    }
    let mut out = String::new();
    for item in health {
        let _ = writeln!(
            out,
            "{:<20} {:>12} of {:>12} ({:>5}%) {:<5} {} to {}",
            item.category_name,
            format_money(item.spent_cents, symbol),
            format_money(item.rule.amount_cents, symbol),
            item.percent_used,
            item.status,
            item.period_start,
            item.period_end,
        );
    }
    out
}

pub fn format_savings_progress(progress: &[GoalProgress], symbol: &str) -> String {
    if progress.is_empty() {
        return "No savings goals\n".to_string();
    }
    let mut out = String::new();
    for item in progress {
        let marker = if item.goal.is_emergency_fund { " [emergency]" } else { "" };
        let _ = write!(
            out,
            "{}{}: {} of {} ({}%)",
            item.goal.name,
            marker,
            format_money(item.balance.balance_cents, symbol),
            format_money(item.goal.target_amount_cents, symbol),
            item.percent_complete,
        );
        if item.balance.interest_cents != 0 {
            let _ = write!(out, ", interest {}", format_money(item.balance.interest_cents, symbol));
        }
        if let (Some(deadline), Some(monthly)) = (item.goal.deadline, item.required_monthly_cents) {
            let _ = write!(out, ", needs {} a month until {}", format_money(monthly, symbol), deadline);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::models::transaction::TransactionType;
    use crate::operations::balance::set_balance_anchor;
    use crate::operations::categories::create_category;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add(conn: &Connection, id: &str, day: NaiveDate, kind: TransactionType, cents: i64, category: Option<&str>) {
        let mut tx = Transaction::new(id.to_string(), day, id.to_string(), cents, kind);
        tx.category_id = category.map(str::to_string);
        repository::add_transaction(conn, &tx).unwrap();
    }

    #[test]
    fn test_cash_flow_buckets_by_month() {
        let conn = establish_test_connection().unwrap();
        set_balance_anchor(&conn, date(2025, 1, 31), 100_000, None).unwrap();
        add(&conn, "pay", date(2025, 2, 1), TransactionType::Income, 300_000, None);
        add(&conn, "shop", date(2025, 2, 14), TransactionType::Expense, 20_000, None);
        add(&conn, "save", date(2025, 3, 2), TransactionType::Savings, 50_000, None);

        let flows = cash_flow(&conn, date(2025, 2, 1), date(2025, 3, 31)).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].net_cents, 280_000);
        assert_eq!(flows[0].closing_cents, 380_000);
        assert_eq!(flows[1].savings_cents, 50_000);
        assert_eq!(flows[1].closing_cents, 330_000);

        assert!(cash_flow(&conn, date(2025, 3, 1), date(2025, 2, 1)).is_err());
    }

    #[test]
    fn test_spending_breakdown_sorted_with_uncategorised() {
        let conn = establish_test_connection().unwrap();
        let food = create_category(&conn, "Food").unwrap();
        let fun = create_category(&conn, "Fun").unwrap();
        add(&conn, "a", date(2025, 2, 1), TransactionType::Expense, 3_000, Some(&food.id));
        add(&conn, "b", date(2025, 2, 2), TransactionType::Expense, 5_000, Some(&fun.id));
        add(&conn, "c", date(2025, 2, 3), TransactionType::Expense, 2_000, None);
        add(&conn, "d", date(2025, 2, 3), TransactionType::Income, 9_000, Some(&food.id));

        let breakdown = spending_breakdown(&conn, date(2025, 2, 1), date(2025, 2, 28)).unwrap();
        assert_eq!(breakdown.total_cents, 10_000);
        let names: Vec<&str> = breakdown.lines.iter().map(|l| l.category.as_str()).collect();
        assert_eq!(names, vec!["Fun", "Food", UNCATEGORISED]);
        assert_eq!(breakdown.lines[0].share_percent, Decimal::new(50, 0));
    }

    #[test]
    fn test_format_breakdown_and_empty_reports() {
        let breakdown = SpendingBreakdown {
            lines: vec![SpendingLine {
                category: "Food".to_string(),
                total_cents: 1234,
                share_percent: Decimal::ONE_HUNDRED,
            }],
            total_cents: 1234,
        };
        let text = format_breakdown(&breakdown, "$");
        assert!(text.contains("Food"));
        assert!(text.contains("$12.34"));

        assert_eq!(format_breakdown(&SpendingBreakdown::default(), "$"), "No expenses in this range\n");
        assert_eq!(format_budget_health(&[], "$"), "No budgets set for this scenario\n");
        assert_eq!(format_savings_progress(&[], "$"), "No savings goals\n");
    }
}
