//! Savings goals: balances, monthly-compounded interest, projections and the
//! contribution needed to hit a target by its deadline.

use crate::db::{repository, savings_repository};
use crate::error::{AppError, AppResult};
use crate::models::savings::{RateStep, SavingsAnchor, SavingsGoal};
use crate::models::transaction::TransactionType;
use crate::money::{percent_of, round_cents};
use crate::operations::add::resolve_goal;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rusqlite::Connection;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct GoalInput {
    pub name: String,
    pub target_amount_cents: i64,
    pub deadline: Option<NaiveDate>,
    pub annual_interest_rate: Option<Decimal>,
    pub interest_rate_schedule: Vec<RateStep>,
    pub is_emergency_fund: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GoalBalance {
    pub balance_cents: i64,
    pub contributed_cents: i64,
    pub interest_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionPoint {
    pub month_end: NaiveDate,
    pub contributed_cents: i64,
    pub interest_cents: i64,
    pub balance_cents: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalProgress {
    pub goal: SavingsGoal,
    pub balance: GoalBalance,
    pub percent_complete: Decimal,
    pub remaining_cents: i64,
    pub months_left: Option<u32>,
    pub required_monthly_cents: Option<i64>,
}

/// Annual percentage in `0..=100`.
pub fn parse_rate(input: &str) -> AppResult<Decimal> {
    let rate = Decimal::from_str(input.trim().trim_end_matches('%'))
        .map_err(|_| AppError::validation(format!("Invalid interest rate '{}'", input.trim())))?;
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(AppError::validation("Interest rate must be between 0 and 100 percent"));
    }
    Ok(rate)
}

/// Parses `YYYY-MM-DD=rate` entries separated by commas.
pub fn parse_schedule(input: &str) -> AppResult<Vec<RateStep>> {
    let mut steps = Vec::new();
    for entry in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (date, rate) = entry.split_once('=').ok_or_else(|| {
            AppError::validation(format!("Invalid schedule entry '{}'. Use YYYY-MM-DD=rate", entry))
        })?;
        steps.push(RateStep {
            effective_from: crate::operations::add::parse_date(date)?,
            annual_rate: parse_rate(rate)?,
        });
    }
    Ok(steps)
}

pub(crate) fn check_goal_input(input: &GoalInput) -> AppResult<GoalInput> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Goal name is required"));
    }
    if name.chars().count() > 100 {
        return Err(AppError::validation("Goal name too long"));
    }
    if input.target_amount_cents <= 0 {
        return Err(AppError::validation("Target amount must be greater than zero"));
    }
    if let Some(rate) = input.annual_interest_rate {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
            return Err(AppError::validation("Interest rate must be between 0 and 100 percent"));
        }
    }

    let mut schedule = input.interest_rate_schedule.clone();
    schedule.sort_by_key(|s| s.effective_from);
    if schedule.windows(2).any(|w| w[0].effective_from == w[1].effective_from) {
        return Err(AppError::validation("Interest schedule has two rates for the same date"));
    }
    if schedule
        .iter()
        .any(|s| s.annual_rate < Decimal::ZERO || s.annual_rate > Decimal::ONE_HUNDRED)
    {
        return Err(AppError::validation("Interest rate must be between 0 and 100 percent"));
    }

    Ok(GoalInput {
        name: name.to_string(),
        interest_rate_schedule: schedule,
        ..input.clone()
    })
}

pub fn create_goal(conn: &Connection, input: &GoalInput) -> AppResult<SavingsGoal> {
    let input = check_goal_input(input)?;
    if savings_repository::find_goal_by_name(conn, &input.name)?.is_some() {
        return Err(AppError::Conflict(format!("Savings goal '{}' already exists", input.name)));
    }
    let goal = SavingsGoal {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        target_amount_cents: input.target_amount_cents,
        deadline: input.deadline,
        annual_interest_rate: input.annual_interest_rate,
        interest_rate_schedule: input.interest_rate_schedule,
        is_emergency_fund: input.is_emergency_fund,
    };
    savings_repository::add_goal(conn, &goal)?;
    info!(id = %goal.id, name = %goal.name, "savings goal created");
    Ok(goal)
}

pub fn update_goal(conn: &Connection, name_or_id: &str, input: &GoalInput) -> AppResult<SavingsGoal> {
    let id = resolve_goal(conn, name_or_id)?;
    let input = check_goal_input(input)?;
    if let Some(other) = savings_repository::find_goal_by_name(conn, &input.name)? {
        if other.id != id {
            return Err(AppError::Conflict(format!("Savings goal '{}' already exists", input.name)));
        }
    }
    let goal = SavingsGoal {
        id,
        name: input.name,
        target_amount_cents: input.target_amount_cents,
        deadline: input.deadline,
        annual_interest_rate: input.annual_interest_rate,
        interest_rate_schedule: input.interest_rate_schedule,
        is_emergency_fund: input.is_emergency_fund,
    };
    savings_repository::update_goal(conn, &goal)?;
    Ok(goal)
}

pub fn get_goal(conn: &Connection, name_or_id: &str) -> AppResult<SavingsGoal> {
    let id = resolve_goal(conn, name_or_id)?;
    savings_repository::get_goal(conn, &id)?.ok_or_else(|| AppError::not_found("Savings goal", id))
}

pub fn list_goals(conn: &Connection) -> AppResult<Vec<SavingsGoal>> {
    savings_repository::get_all_goals(conn)
}

/// Goals with contributions keep their history and cannot be deleted.
pub fn delete_goal(conn: &Connection, name_or_id: &str) -> AppResult<()> {
    let id = resolve_goal(conn, name_or_id)?;
    let used = repository::count_for_goal(conn, &id)?;
    if used > 0 {
        return Err(AppError::Conflict(format!(
            "Savings goal is referenced by {} transaction(s)",
            used
        )));
    }
    savings_repository::delete_goal(conn, &id)?;
    info!(%id, "savings goal deleted");
    Ok(())
}

pub fn set_savings_anchor(
    conn: &Connection,
    name_or_id: &str,
    date: NaiveDate,
    balance_cents: i64,
) -> AppResult<SavingsAnchor> {
    if balance_cents < 0 {
        return Err(AppError::validation("Savings balance cannot be negative"));
    }
    let anchor = SavingsAnchor {
        id: Uuid::new_v4().to_string(),
        savings_goal_id: resolve_goal(conn, name_or_id)?,
        date,
        balance_cents,
    };
    savings_repository::set_anchor(conn, &anchor)?;
    Ok(anchor)
}

pub fn list_savings_anchors(conn: &Connection, goal_id: &str) -> AppResult<Vec<SavingsAnchor>> {
    savings_repository::get_anchors_for_goal(conn, goal_id)
}

pub fn delete_savings_anchor(conn: &Connection, id: &str) -> AppResult<()> {
    savings_repository::delete_anchor(conn, id)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn monthly_interest(goal: &SavingsGoal, balance_cents: i64, on: NaiveDate) -> i64 {
    if balance_cents <= 0 {
        return 0;
    }
    round_cents(Decimal::from(balance_cents) * goal.rate_on(on) / Decimal::from(1200))
}

/// Rolls `opening` (the balance at the end of `baseline`) forward to the end
/// of `as_of`. Contributions are `(date, cents)` pairs; only those after the
/// baseline count. Interest is credited on the first day of each month.
pub fn accrue(
    goal: &SavingsGoal,
    opening: i64,
    baseline: NaiveDate,
    contributions: &[(NaiveDate, i64)],
    as_of: NaiveDate,
) -> GoalBalance {
    let mut pending: Vec<(NaiveDate, i64)> = contributions
        .iter()
        .copied()
        .filter(|(d, _)| *d > baseline && *d <= as_of)
        .collect();
    pending.sort_by_key(|(d, _)| *d);
    let mut pending = pending.into_iter().peekable();

    let mut result = GoalBalance {
        balance_cents: opening,
        ..Default::default()
    };
    let mut boundary = first_of_next_month(baseline);
    while let Some(month_start) = boundary.filter(|b| *b <= as_of) {
        while let Some((_, cents)) = pending.next_if(|(d, _)| *d < month_start) {
            result.balance_cents += cents;
            result.contributed_cents += cents;
        }
        let interest = monthly_interest(goal, result.balance_cents, month_start);
        result.balance_cents += interest;
        result.interest_cents += interest;
        boundary = first_of_next_month(month_start);
    }
    for (_, cents) in pending {
        result.balance_cents += cents;
        result.contributed_cents += cents;
    }
    result
}

/// Balance of the goal at the end of `as_of` from its latest anchor and the
/// savings transactions after it.
pub fn goal_balance(conn: &Connection, goal: &SavingsGoal, as_of: NaiveDate) -> AppResult<GoalBalance> {
    let anchor = savings_repository::latest_anchor_on_or_before(conn, &goal.id, as_of)?;
    let filter = repository::TransactionFilter {
        transaction_type: Some(TransactionType::Savings),
        savings_goal_id: Some(goal.id.clone()),
        to: Some(as_of),
        from: anchor.as_ref().and_then(|a| a.date.succ_opt()),
        ..Default::default()
    };
    let contributions: Vec<(NaiveDate, i64)> = repository::list_transactions(conn, &filter)?
        .into_iter()
        .map(|t| (t.date, t.amount_cents))
        .collect();

    let (opening, baseline) = match anchor {
        Some(a) => (a.balance_cents, a.date),
        None => {
            let first = contributions.iter().map(|(d, _)| *d).min().unwrap_or(as_of);
            (0, first.pred_opt().unwrap_or(first))
        }
    };
    Ok(accrue(goal, opening, baseline, &contributions, as_of))
}

/// Month-by-month projection starting the month after `from`: each month the
/// opening balance earns interest, then `monthly_contribution_cents` is added.
pub fn project_goal(
    goal: &SavingsGoal,
    start_balance_cents: i64,
    from: NaiveDate,
    monthly_contribution_cents: i64,
    months: u32,
) -> Vec<ProjectionPoint> {
    let mut points = Vec::with_capacity(months as usize);
    let mut balance = start_balance_cents;
    let mut contributed = 0;
    let mut interest_total = 0;
    let mut month_start = first_of_next_month(from);

    for _ in 0..months {
        let Some(start) = month_start else { break };
        let interest = monthly_interest(goal, balance, start);
        balance += interest + monthly_contribution_cents;
        interest_total += interest;
        contributed += monthly_contribution_cents;

        month_start = first_of_next_month(start);
        let Some(month_end) = month_start.and_then(|d| d.pred_opt()) else { break };
        points.push(ProjectionPoint {
            month_end,
            contributed_cents: contributed,
            interest_cents: interest_total,
            balance_cents: balance,
        });
    }
    points
}

/// Month boundaries strictly after `today` up to and including the
/// deadline's month.
pub fn months_until(today: NaiveDate, deadline: NaiveDate) -> u32 {
    let diff = (deadline.year() - today.year()) * 12 + deadline.month() as i32 - today.month() as i32;
    diff.max(0) as u32
}

/// Smallest monthly amount that reaches the target by the deadline.
/// `None` when the goal has no deadline.
pub fn required_monthly_contribution(goal: &SavingsGoal, balance_cents: i64, today: NaiveDate) -> Option<i64> {
    let deadline = goal.deadline?;
    let shortfall = goal.target_amount_cents - balance_cents;
    if shortfall <= 0 {
        return Some(0);
    }
    let months = months_until(today, deadline);
    if months == 0 {
        return Some(shortfall);
    }

    let reaches = |monthly: i64| {
        project_goal(goal, balance_cents, today, monthly, months)
            .last()
            .is_some_and(|p| p.balance_cents >= goal.target_amount_cents)
    };
    let (mut low, mut high) = (0, shortfall);
    while low < high {
        let mid = low + (high - low) / 2;
        if reaches(mid) {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    Some(low)
}

pub fn goal_progress(conn: &Connection, goal: &SavingsGoal, today: NaiveDate) -> AppResult<GoalProgress> {
    let balance = goal_balance(conn, goal, today)?;
    let percent_complete = percent_of(balance.balance_cents, goal.target_amount_cents);
    Ok(GoalProgress {
        goal: goal.clone(),
        balance,
        percent_complete,
        remaining_cents: (goal.target_amount_cents - balance.balance_cents).max(0),
        months_left: goal.deadline.map(|d| months_until(today, d)),
        required_monthly_cents: required_monthly_contribution(goal, balance.balance_cents, today),
    })
}

pub fn all_goal_progress(conn: &Connection, today: NaiveDate) -> AppResult<Vec<GoalProgress>> {
    list_goals(conn)?
        .iter()
        .map(|goal| goal_progress(conn, goal, today))
        .collect()
}
