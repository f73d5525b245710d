//! Column conversions shared by the repositories.

use crate::error::AppError;
use crate::models::recurrence::{Cadence, Recurrence};
use crate::models::transaction::TransactionType;
use chrono::{NaiveDate, Weekday};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::Row;
use rust_decimal::Decimal;
use std::str::FromStr;

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: AppError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Cadence {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Cadence {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: AppError| FromSqlError::Other(Box::new(e)))
    }
}

/// Flattened form of a [`Recurrence`]: cadence, weekday (0 = Monday),
/// day of month, month, fortnight anchor.
pub struct RecurrenceColumns {
    pub cadence: Cadence,
    pub weekday: Option<u8>,
    pub day_of_month: Option<u32>,
    pub month: Option<u32>,
    pub anchor_date: Option<NaiveDate>,
}

impl From<&Recurrence> for RecurrenceColumns {
    fn from(recurrence: &Recurrence) -> Self {
        let mut columns = RecurrenceColumns {
            cadence: recurrence.cadence(),
            weekday: None,
            day_of_month: None,
            month: None,
            anchor_date: None,
        };
        match *recurrence {
            Recurrence::Weekly { weekday } => {
                columns.weekday = Some(weekday.num_days_from_monday() as u8);
            }
            Recurrence::Fortnightly { weekday, anchor } => {
                columns.weekday = Some(weekday.num_days_from_monday() as u8);
                columns.anchor_date = Some(anchor);
            }
            Recurrence::Monthly { day_of_month } => {
                columns.day_of_month = Some(day_of_month);
            }
            Recurrence::Quarterly {
                month_of_quarter,
                day_of_month,
            } => {
                columns.month = Some(month_of_quarter);
                columns.day_of_month = Some(day_of_month);
            }
            Recurrence::Yearly { month, day_of_month } => {
                columns.month = Some(month);
                columns.day_of_month = Some(day_of_month);
            }
        }
        columns
    }
}

/// Reads the five recurrence columns starting at `start`.
pub fn recurrence_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Recurrence> {
    let cadence: Cadence = row.get(start)?;
    let weekday_raw: Option<u8> = row.get(start + 1)?;
    let day_of_month: Option<u32> = row.get(start + 2)?;
    let month: Option<u32> = row.get(start + 3)?;
    let anchor_date: Option<NaiveDate> = row.get(start + 4)?;

    let missing = |offset: usize, what: &str| {
        rusqlite::Error::FromSqlConversionFailure(
            start + offset,
            Type::Null,
            Box::new(AppError::validation(format!(
                "{} recurrence without {}",
                cadence, what
            ))),
        )
    };
    let weekday = || -> rusqlite::Result<Weekday> {
        let raw = weekday_raw.ok_or_else(|| missing(1, "weekday"))?;
        Weekday::try_from(raw).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                start + 1,
                Type::Integer,
                Box::new(AppError::validation(format!("Invalid weekday number {}", raw))),
            )
        })
    };
    let day = || day_of_month.ok_or_else(|| missing(2, "day of month"));
    let month = || month.ok_or_else(|| missing(3, "month"));

    Ok(match cadence {
        Cadence::Weekly => Recurrence::Weekly { weekday: weekday()? },
        Cadence::Fortnightly => Recurrence::Fortnightly {
            weekday: weekday()?,
            anchor: anchor_date.ok_or_else(|| missing(4, "anchor date"))?,
        },
        Cadence::Monthly => Recurrence::Monthly { day_of_month: day()? },
        Cadence::Quarterly => Recurrence::Quarterly {
            month_of_quarter: month()?,
            day_of_month: day()?,
        },
        Cadence::Yearly => Recurrence::Yearly {
            month: month()?,
            day_of_month: day()?,
        },
    })
}

/// Decimals are stored as text to keep them exact.
pub fn decimal_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;

    fn round_trip(recurrence: Recurrence) -> Recurrence {
        let conn = establish_test_connection().unwrap();
        let cols = RecurrenceColumns::from(&recurrence);
        conn.query_row(
            "SELECT ?1, ?2, ?3, ?4, ?5",
            rusqlite::params![
                cols.cadence,
                cols.weekday,
                cols.day_of_month,
                cols.month,
                cols.anchor_date
            ],
            |row| recurrence_from_row(row, 0),
        )
        .unwrap()
    }

    #[test]
    fn test_fortnightly_columns_keep_anchor() {
        let r = Recurrence::Fortnightly {
            weekday: Weekday::Fri,
            anchor: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
        };
        assert_eq!(round_trip(r), r);
    }

    #[test]
    fn test_missing_day_is_reported() {
        let conn = establish_test_connection().unwrap();
        let result = conn.query_row(
            "SELECT 'monthly', NULL, NULL, NULL, NULL",
            [],
            |row| recurrence_from_row(row, 0),
        );
        assert!(result.is_err());
    }
}
