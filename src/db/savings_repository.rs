use crate::db::sql::decimal_from_row;
use crate::error::{AppError, AppResult};
use crate::models::savings::{RateStep, SavingsAnchor, SavingsGoal};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

const GOAL_COLUMNS: &str =
    "id, name, target_amount_cents, deadline, annual_interest_rate, is_emergency_fund";

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<SavingsGoal> {
    Ok(SavingsGoal {
        id: row.get(0)?,
        name: row.get(1)?,
        target_amount_cents: row.get(2)?,
        deadline: row.get(3)?,
        annual_interest_rate: decimal_from_row(row, 4)?,
        interest_rate_schedule: Vec::new(),
        is_emergency_fund: row.get(5)?,
    })
}

fn load_schedule(conn: &Connection, goal: &mut SavingsGoal) -> AppResult<()> {
    let mut stmt = conn.prepare(
        "SELECT effective_from, annual_rate FROM savings_rate_steps \
         WHERE savings_goal_id = ?1 ORDER BY effective_from ASC",
    )?;
    let rows = stmt.query_map([&goal.id], |row| {
        let annual_rate = decimal_from_row(row, 1)?.ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(1, "annual_rate".to_string(), Type::Null)
        })?;
        Ok(RateStep {
            effective_from: row.get(0)?,
            annual_rate,
        })
    })?;
    goal.interest_rate_schedule = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

fn write_schedule(conn: &Connection, goal: &SavingsGoal) -> AppResult<()> {
    conn.execute("DELETE FROM savings_rate_steps WHERE savings_goal_id = ?1", [&goal.id])?;
    for step in &goal.interest_rate_schedule {
        conn.execute(
            "INSERT INTO savings_rate_steps (savings_goal_id, effective_from, annual_rate) \
             VALUES (?1, ?2, ?3)",
            params![goal.id, step.effective_from, step.annual_rate.to_string()],
        )?;
    }
    Ok(())
}

pub fn add_goal(conn: &Connection, goal: &SavingsGoal) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;
    insert_goal(&tx, goal)?;
    tx.commit()?;
    Ok(())
}

/// Inserts the goal and its rate schedule without opening a transaction of
/// its own; the caller provides one.
pub fn insert_goal(conn: &Connection, goal: &SavingsGoal) -> AppResult<()> {
    conn.execute(
        &format!("INSERT INTO savings_goals ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", GOAL_COLUMNS),
        params![
            goal.id,
            goal.name,
            goal.target_amount_cents,
            goal.deadline,
            goal.annual_interest_rate.map(|r| r.to_string()),
            goal.is_emergency_fund,
        ],
    )?;
    write_schedule(conn, goal)
}

pub fn update_goal(conn: &Connection, goal: &SavingsGoal) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;
    let rows = tx.execute(
        "UPDATE savings_goals SET name = ?2, target_amount_cents = ?3, deadline = ?4, \
         annual_interest_rate = ?5, is_emergency_fund = ?6 WHERE id = ?1",
        params![
            goal.id,
            goal.name,
            goal.target_amount_cents,
            goal.deadline,
            goal.annual_interest_rate.map(|r| r.to_string()),
            goal.is_emergency_fund,
        ],
    )?;
    if rows == 0 {
        return Err(AppError::not_found("Savings goal", &goal.id));
    }
    write_schedule(&tx, goal)?;
    tx.commit()?;
    Ok(())
}

pub fn get_goal(conn: &Connection, id: &str) -> AppResult<Option<SavingsGoal>> {
    let sql = format!("SELECT {} FROM savings_goals WHERE id = ?1", GOAL_COLUMNS);
    let goal = conn.query_row(&sql, [id], goal_from_row).optional()?;
    match goal {
        Some(mut goal) => {
            load_schedule(conn, &mut goal)?;
            Ok(Some(goal))
        }
        None => Ok(None),
    }
}

pub fn find_goal_by_name(conn: &Connection, name: &str) -> AppResult<Option<SavingsGoal>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM savings_goals WHERE LOWER(name) = LOWER(?1)",
            [name.trim()],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => get_goal(conn, &id),
        None => Ok(None),
    }
}

pub fn get_all_goals(conn: &Connection) -> AppResult<Vec<SavingsGoal>> {
    let sql = format!(
        "SELECT {} FROM savings_goals ORDER BY is_emergency_fund DESC, name COLLATE NOCASE ASC",
        GOAL_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], goal_from_row)?;
    let mut goals = rows.collect::<Result<Vec<_>, _>>()?;
    for goal in &mut goals {
        load_schedule(conn, goal)?;
    }
    Ok(goals)
}

pub fn delete_goal(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM savings_goals WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Savings goal", id));
    }
    Ok(())
}

fn anchor_from_row(row: &Row<'_>) -> rusqlite::Result<SavingsAnchor> {
    Ok(SavingsAnchor {
        id: row.get(0)?,
        savings_goal_id: row.get(1)?,
        date: row.get(2)?,
        balance_cents: row.get(3)?,
    })
}

/// Inserts the anchor or replaces the balance of the goal's anchor on the same date.
pub fn set_anchor(conn: &Connection, anchor: &SavingsAnchor) -> AppResult<()> {
    conn.execute(
        "INSERT INTO savings_anchors (id, savings_goal_id, date, balance_cents) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(savings_goal_id, date) DO UPDATE SET balance_cents = excluded.balance_cents",
        params![anchor.id, anchor.savings_goal_id, anchor.date, anchor.balance_cents],
    )?;
    Ok(())
}

pub fn get_anchors_for_goal(conn: &Connection, goal_id: &str) -> AppResult<Vec<SavingsAnchor>> {
    let mut stmt = conn.prepare(
        "SELECT id, savings_goal_id, date, balance_cents FROM savings_anchors \
         WHERE savings_goal_id = ?1 ORDER BY date ASC",
    )?;
    let rows = stmt.query_map([goal_id], anchor_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_all_anchors(conn: &Connection) -> AppResult<Vec<SavingsAnchor>> {
    let mut stmt = conn.prepare(
        "SELECT id, savings_goal_id, date, balance_cents FROM savings_anchors \
         ORDER BY savings_goal_id, date",
    )?;
    let rows = stmt.query_map([], anchor_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Latest anchor of the goal dated on or before `date`.
pub fn latest_anchor_on_or_before(
    conn: &Connection,
    goal_id: &str,
    date: NaiveDate,
) -> AppResult<Option<SavingsAnchor>> {
    Ok(conn
        .query_row(
            "SELECT id, savings_goal_id, date, balance_cents FROM savings_anchors \
             WHERE savings_goal_id = ?1 AND date <= ?2 ORDER BY date DESC LIMIT 1",
            params![goal_id, date],
            anchor_from_row,
        )
        .optional()?)
}

pub fn delete_anchor(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM savings_anchors WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Savings anchor", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn goal() -> SavingsGoal {
        SavingsGoal {
            id: "g1".to_string(),
            name: "House deposit".to_string(),
            target_amount_cents: 5_000_000,
            deadline: Some(date(2027, 6, 30)),
            annual_interest_rate: Some(Decimal::new(425, 2)),
            interest_rate_schedule: vec![RateStep {
                effective_from: date(2026, 1, 1),
                annual_rate: Decimal::new(5, 0),
            }],
            is_emergency_fund: false,
        }
    }

    #[test]
    fn test_goal_with_schedule_round_trips() {
        let conn = establish_test_connection().unwrap();
        add_goal(&conn, &goal()).unwrap();
        assert_eq!(get_goal(&conn, "g1").unwrap().unwrap(), goal());
        assert_eq!(find_goal_by_name(&conn, "house DEPOSIT").unwrap().unwrap().id, "g1");
    }

    #[test]
    fn test_update_goal_replaces_schedule() {
        let conn = establish_test_connection().unwrap();
        add_goal(&conn, &goal()).unwrap();
        let mut changed = goal();
        changed.interest_rate_schedule.clear();
        changed.annual_interest_rate = None;
        update_goal(&conn, &changed).unwrap();

        let stored = get_goal(&conn, "g1").unwrap().unwrap();
        assert!(stored.interest_rate_schedule.is_empty());
        assert!(stored.annual_interest_rate.is_none());
    }

    #[test]
    fn test_anchor_upsert_and_latest() {
        let conn = establish_test_connection().unwrap();
        add_goal(&conn, &goal()).unwrap();
        let anchor = |id: &str, d: NaiveDate, cents: i64| SavingsAnchor {
            id: id.to_string(),
            savings_goal_id: "g1".to_string(),
            date: d,
            balance_cents: cents,
        };
        set_anchor(&conn, &anchor("a1", date(2025, 1, 1), 1000)).unwrap();
        set_anchor(&conn, &anchor("a2", date(2025, 3, 1), 5000)).unwrap();
        set_anchor(&conn, &anchor("a3", date(2025, 3, 1), 6000)).unwrap();

        assert_eq!(get_anchors_for_goal(&conn, "g1").unwrap().len(), 2);
        let latest = latest_anchor_on_or_before(&conn, "g1", date(2025, 4, 1)).unwrap().unwrap();
        assert_eq!(latest.balance_cents, 6000);
        let earlier = latest_anchor_on_or_before(&conn, "g1", date(2025, 2, 1)).unwrap().unwrap();
        assert_eq!(earlier.balance_cents, 1000);
        assert!(latest_anchor_on_or_before(&conn, "g1", date(2024, 1, 1)).unwrap().is_none());
    }

    #[test]
    fn test_delete_goal_removes_anchors() {
        let conn = establish_test_connection().unwrap();
        add_goal(&conn, &goal()).unwrap();
        set_anchor(
            &conn,
            &SavingsAnchor {
                id: "a1".to_string(),
                savings_goal_id: "g1".to_string(),
                date: date(2025, 1, 1),
                balance_cents: 1,
            },
        )
        .unwrap();
        delete_goal(&conn, "g1").unwrap();
        assert!(get_all_anchors(&conn).unwrap().is_empty());
    }
}
