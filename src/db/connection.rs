use crate::error::AppResult;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    is_archived INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_name ON categories (name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS savings_goals (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    target_amount_cents INTEGER NOT NULL,
    deadline TEXT,
    annual_interest_rate TEXT,
    is_emergency_fund INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS savings_rate_steps (
    savings_goal_id TEXT NOT NULL REFERENCES savings_goals (id) ON DELETE CASCADE,
    effective_from TEXT NOT NULL,
    annual_rate TEXT NOT NULL,
    PRIMARY KEY (savings_goal_id, effective_from)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('income', 'expense', 'savings', 'adjustment')),
    category_id TEXT REFERENCES categories (id),
    savings_goal_id TEXT REFERENCES savings_goals (id),
    payment_method TEXT,
    notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions (date);

CREATE TABLE IF NOT EXISTS scenarios (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_scenarios_name ON scenarios (name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS budget_rules (
    id TEXT PRIMARY KEY,
    scenario_id TEXT NOT NULL REFERENCES scenarios (id) ON DELETE CASCADE,
    category_id TEXT NOT NULL REFERENCES categories (id),
    amount_cents INTEGER NOT NULL,
    cadence TEXT NOT NULL,
    weekday INTEGER,
    day_of_month INTEGER,
    month INTEGER,
    anchor_date TEXT,
    UNIQUE (scenario_id, category_id)
);

CREATE TABLE IF NOT EXISTS forecast_rules (
    id TEXT PRIMARY KEY,
    scenario_id TEXT NOT NULL REFERENCES scenarios (id) ON DELETE CASCADE,
    transaction_type TEXT NOT NULL,
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    cadence TEXT NOT NULL,
    weekday INTEGER,
    day_of_month INTEGER,
    month INTEGER,
    anchor_date TEXT,
    starts_on TEXT NOT NULL,
    ends_on TEXT,
    category_id TEXT REFERENCES categories (id),
    savings_goal_id TEXT REFERENCES savings_goals (id)
);

CREATE TABLE IF NOT EXISTS forecast_events (
    id TEXT PRIMARY KEY,
    scenario_id TEXT NOT NULL REFERENCES scenarios (id) ON DELETE CASCADE,
    transaction_type TEXT NOT NULL,
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    date TEXT NOT NULL,
    category_id TEXT REFERENCES categories (id),
    savings_goal_id TEXT REFERENCES savings_goals (id)
);

CREATE TABLE IF NOT EXISTS balance_anchors (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL UNIQUE,
    balance_cents INTEGER NOT NULL,
    note TEXT
);

CREATE TABLE IF NOT EXISTS savings_anchors (
    id TEXT PRIMARY KEY,
    savings_goal_id TEXT NOT NULL REFERENCES savings_goals (id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    balance_cents INTEGER NOT NULL,
    UNIQUE (savings_goal_id, date)
);

CREATE TABLE IF NOT EXISTS category_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL,
    category_id TEXT NOT NULL REFERENCES categories (id)
);
";

pub fn establish_connection(path: &Path) -> AppResult<Connection> {
    debug!(path = %path.display(), "opening database");
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
pub fn establish_test_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = establish_test_connection().unwrap();
        assert!(init_schema(&conn).is_ok());
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = establish_test_connection().unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.db");
        establish_connection(&path).unwrap();
        assert!(path.exists());
    }
}
