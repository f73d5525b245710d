use crate::db::sql::{RecurrenceColumns, recurrence_from_row};
use crate::error::{AppError, AppResult};
use crate::models::forecast::{ForecastEvent, ForecastRule};
use rusqlite::{Connection, OptionalExtension, Row, params};

const RULE_COLUMNS: &str = "id, scenario_id, transaction_type, description, amount_cents, \
     cadence, weekday, day_of_month, month, anchor_date, starts_on, ends_on, category_id, savings_goal_id";

const EVENT_COLUMNS: &str =
    "id, scenario_id, transaction_type, description, amount_cents, date, category_id, savings_goal_id";

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<ForecastRule> {
    Ok(ForecastRule {
        id: row.get(0)?,
        scenario_id: row.get(1)?,
        transaction_type: row.get(2)?,
        description: row.get(3)?,
        amount_cents: row.get(4)?,
        recurrence: recurrence_from_row(row, 5)?,
        starts_on: row.get(10)?,
        ends_on: row.get(11)?,
        category_id: row.get(12)?,
        savings_goal_id: row.get(13)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ForecastEvent> {
    Ok(ForecastEvent {
        id: row.get(0)?,
        scenario_id: row.get(1)?,
        transaction_type: row.get(2)?,
        description: row.get(3)?,
        amount_cents: row.get(4)?,
        date: row.get(5)?,
        category_id: row.get(6)?,
        savings_goal_id: row.get(7)?,
    })
}

pub fn add_rule(conn: &Connection, rule: &ForecastRule) -> AppResult<()> {
    let cols = RecurrenceColumns::from(&rule.recurrence);
    conn.execute(
        &format!(
            "INSERT INTO forecast_rules ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            RULE_COLUMNS
        ),
        params![
            rule.id,
            rule.scenario_id,
            rule.transaction_type,
            rule.description,
            rule.amount_cents,
            cols.cadence,
            cols.weekday,
            cols.day_of_month,
            cols.month,
            cols.anchor_date,
            rule.starts_on,
            rule.ends_on,
            rule.category_id,
            rule.savings_goal_id,
        ],
    )?;
    Ok(())
}

pub fn get_rule(conn: &Connection, id: &str) -> AppResult<Option<ForecastRule>> {
    let sql = format!("SELECT {} FROM forecast_rules WHERE id = ?1", RULE_COLUMNS);
    Ok(conn.query_row(&sql, [id], rule_from_row).optional()?)
}

pub fn get_rules_for_scenario(conn: &Connection, scenario_id: &str) -> AppResult<Vec<ForecastRule>> {
    let sql = format!(
        "SELECT {} FROM forecast_rules WHERE scenario_id = ?1 ORDER BY starts_on ASC, description ASC",
        RULE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([scenario_id], rule_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_all_rules(conn: &Connection) -> AppResult<Vec<ForecastRule>> {
    let sql = format!("SELECT {} FROM forecast_rules ORDER BY scenario_id, starts_on", RULE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], rule_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn update_rule_amount(conn: &Connection, id: &str, amount_cents: i64) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE forecast_rules SET amount_cents = ?2 WHERE id = ?1",
        params![id, amount_cents],
    )?;
    if rows == 0 {
        return Err(AppError::not_found("Forecast rule", id));
    }
    Ok(())
}

pub fn remove_rule(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM forecast_rules WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Forecast rule", id));
    }
    Ok(())
}

pub fn add_event(conn: &Connection, event: &ForecastEvent) -> AppResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO forecast_events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            EVENT_COLUMNS
        ),
        params![
            event.id,
            event.scenario_id,
            event.transaction_type,
            event.description,
            event.amount_cents,
            event.date,
            event.category_id,
            event.savings_goal_id,
        ],
    )?;
    Ok(())
}

pub fn get_events_for_scenario(conn: &Connection, scenario_id: &str) -> AppResult<Vec<ForecastEvent>> {
    let sql = format!(
        "SELECT {} FROM forecast_events WHERE scenario_id = ?1 ORDER BY date ASC, description ASC",
        EVENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([scenario_id], event_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_all_events(conn: &Connection) -> AppResult<Vec<ForecastEvent>> {
    let sql = format!("SELECT {} FROM forecast_events ORDER BY scenario_id, date", EVENT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], event_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn remove_event(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM forecast_events WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Forecast event", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::models::recurrence::Recurrence;
    use crate::models::transaction::TransactionType;
    use chrono::{NaiveDate, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> Connection {
        let conn = establish_test_connection().unwrap();
        conn.execute(
            "INSERT INTO scenarios (id, name, is_default, created_at) VALUES ('s1', 'Base', 1, 'now')",
            [],
        )
        .unwrap();
        conn
    }

    fn salary() -> ForecastRule {
        ForecastRule {
            id: "r1".to_string(),
            scenario_id: "s1".to_string(),
            transaction_type: TransactionType::Income,
            description: "Salary".to_string(),
            amount_cents: 320000,
            recurrence: Recurrence::Fortnightly {
                weekday: Weekday::Thu,
                anchor: date(2025, 1, 2),
            },
            starts_on: date(2025, 1, 1),
            ends_on: Some(date(2025, 12, 31)),
            category_id: None,
            savings_goal_id: None,
        }
    }

    #[test]
    fn test_rule_stored_and_loaded() {
        let conn = setup();
        add_rule(&conn, &salary()).unwrap();
        assert_eq!(get_rule(&conn, "r1").unwrap().unwrap(), salary());
        assert_eq!(get_rules_for_scenario(&conn, "s1").unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_remove_rule() {
        let conn = setup();
        add_rule(&conn, &salary()).unwrap();
        update_rule_amount(&conn, "r1", 330000).unwrap();
        assert_eq!(get_rule(&conn, "r1").unwrap().unwrap().amount_cents, 330000);
        remove_rule(&conn, "r1").unwrap();
        assert!(remove_rule(&conn, "r1").is_err());
    }

    #[test]
    fn test_events_ordered_by_date() {
        let conn = setup();
        for (id, day) in [("e1", 20), ("e2", 5)] {
            add_event(
                &conn,
                &ForecastEvent {
                    id: id.to_string(),
                    scenario_id: "s1".to_string(),
                    transaction_type: TransactionType::Income,
                    description: "Bonus".to_string(),
                    amount_cents: 1000,
                    date: date(2025, 3, day),
                    category_id: None,
                    savings_goal_id: None,
                },
            )
            .unwrap();
        }
        let events = get_events_for_scenario(&conn, "s1").unwrap();
        assert_eq!(events[0].id, "e2");
        remove_event(&conn, "e1").unwrap();
        assert_eq!(get_all_events(&conn).unwrap().len(), 1);
    }
}
