use crate::error::{AppError, AppResult};
use crate::models::anchor::BalanceAnchor;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn anchor_from_row(row: &Row<'_>) -> rusqlite::Result<BalanceAnchor> {
    Ok(BalanceAnchor {
        id: row.get(0)?,
        date: row.get(1)?,
        balance_cents: row.get(2)?,
        note: row.get(3)?,
    })
}

/// Inserts the anchor or replaces balance and note of the anchor on the same date.
pub fn set_anchor(conn: &Connection, anchor: &BalanceAnchor) -> AppResult<()> {
    conn.execute(
        "INSERT INTO balance_anchors (id, date, balance_cents, note) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(date) DO UPDATE SET balance_cents = excluded.balance_cents, note = excluded.note",
        params![anchor.id, anchor.date, anchor.balance_cents, anchor.note],
    )?;
    Ok(())
}

pub fn get_all_anchors(conn: &Connection) -> AppResult<Vec<BalanceAnchor>> {
    let mut stmt =
        conn.prepare("SELECT id, date, balance_cents, note FROM balance_anchors ORDER BY date ASC")?;
    let rows = stmt.query_map([], anchor_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn latest_on_or_before(conn: &Connection, date: NaiveDate) -> AppResult<Option<BalanceAnchor>> {
    Ok(conn
        .query_row(
            "SELECT id, date, balance_cents, note FROM balance_anchors \
             WHERE date <= ?1 ORDER BY date DESC LIMIT 1",
            [date],
            anchor_from_row,
        )
        .optional()?)
}

pub fn get_in_range(conn: &Connection, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<BalanceAnchor>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, balance_cents, note FROM balance_anchors \
         WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
    )?;
    let rows = stmt.query_map(params![from, to], anchor_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn delete_anchor(conn: &Connection, id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM balance_anchors WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(AppError::not_found("Balance anchor", id));
    }
    Ok(())
}
