//! Calendar arithmetic for recurring rules.
//!
//! Every cadence is closed-form: weekly and fortnightly occurrences step by
//! a fixed number of days from an aligned start, the month-based cadences
//! visit each eligible month once and clamp the day to the month's length
//! (a rule on the 31st falls on the 30th in April and the 28th or 29th in
//! February).

use crate::error::{AppError, AppResult};
use crate::models::recurrence::{Cadence, Recurrence};
use crate::money::round_cents;
use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)))
}

/// Shifts a (year, month) pair by `delta` months.
fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Day of month for month-based cadences, or None if `month` is not one of
/// the rule's months.
fn month_occurrence(recurrence: &Recurrence, year: i32, month: u32) -> Option<NaiveDate> {
    match *recurrence {
        Recurrence::Monthly { day_of_month } => clamped_date(year, month, day_of_month),
        Recurrence::Quarterly {
            month_of_quarter,
            day_of_month,
        } => {
            if (month - 1) % 3 + 1 == month_of_quarter {
                clamped_date(year, month, day_of_month)
            } else {
                None
            }
        }
        Recurrence::Yearly {
            month: rule_month,
            day_of_month,
        } => {
            if month == rule_month {
                clamped_date(year, month, day_of_month)
            } else {
                None
            }
        }
        Recurrence::Weekly { .. } | Recurrence::Fortnightly { .. } => None,
    }
}

/// First occurrence on or after `date` for the day-stepped cadences.
fn first_stepped_on_or_after(recurrence: &Recurrence, date: NaiveDate) -> Option<(NaiveDate, u64)> {
    match *recurrence {
        Recurrence::Weekly { weekday } => {
            let offset = (weekday.num_days_from_monday() as i64
                - date.weekday().num_days_from_monday() as i64)
                .rem_euclid(7);
            Some((date.checked_add_days(Days::new(offset as u64))?, 7))
        }
        Recurrence::Fortnightly { anchor, .. } => {
            let behind = (date - anchor).num_days().rem_euclid(14);
            let offset = (14 - behind) % 14;
            Some((date.checked_add_days(Days::new(offset as u64))?, 14))
        }
        _ => None,
    }
}

/// All occurrences within the inclusive window `[start, end]`, ascending.
pub fn occurrences_between(
    recurrence: &Recurrence,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<NaiveDate>> {
    if start > end {
        return Err(AppError::validation(format!(
            "Start date {} must not be after end date {}",
            start, end
        )));
    }
    recurrence.validate()?;

    let mut dates = Vec::new();
    match recurrence.cadence() {
        Cadence::Weekly | Cadence::Fortnightly => {
            let Some((mut current, step)) = first_stepped_on_or_after(recurrence, start) else {
                return Ok(dates);
            };
            while current <= end {
                dates.push(current);
                match current.checked_add_days(Days::new(step)) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
        Cadence::Monthly | Cadence::Quarterly | Cadence::Yearly => {
            let (mut year, mut month) = (start.year(), start.month());
            while (year, month) <= (end.year(), end.month()) {
                if let Some(date) = month_occurrence(recurrence, year, month) {
                    if date >= start && date <= end {
                        dates.push(date);
                    }
                }
                (year, month) = shift_month(year, month, 1);
            }
        }
    }
    Ok(dates)
}

/// Latest occurrence on or before `date`.
pub fn previous_on_or_before(recurrence: &Recurrence, date: NaiveDate) -> Option<NaiveDate> {
    match *recurrence {
        Recurrence::Weekly { weekday } => {
            let back = (date.weekday().num_days_from_monday() as i64
                - weekday.num_days_from_monday() as i64)
                .rem_euclid(7);
            date.checked_sub_days(Days::new(back as u64))
        }
        Recurrence::Fortnightly { anchor, .. } => {
            let back = (date - anchor).num_days().rem_euclid(14);
            date.checked_sub_days(Days::new(back as u64))
        }
        _ => (0..=12).find_map(|back| {
            let (year, month) = shift_month(date.year(), date.month(), -back);
            month_occurrence(recurrence, year, month).filter(|d| *d <= date)
        }),
    }
}

/// Earliest occurrence strictly after `date`.
pub fn next_after(recurrence: &Recurrence, date: NaiveDate) -> Option<NaiveDate> {
    let tomorrow = date.succ_opt()?;
    match recurrence.cadence() {
        Cadence::Weekly | Cadence::Fortnightly => {
            first_stepped_on_or_after(recurrence, tomorrow).map(|(d, _)| d)
        }
        _ => (0..=12).find_map(|ahead| {
            let (year, month) = shift_month(tomorrow.year(), tomorrow.month(), ahead);
            month_occurrence(recurrence, year, month).filter(|d| *d >= tomorrow)
        }),
    }
}

/// The period `[start, end]` of the recurrence that contains `date`: from the
/// latest occurrence on or before it to the day before the next one.
pub fn period_containing(recurrence: &Recurrence, date: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
    recurrence.validate()?;
    let start = previous_on_or_before(recurrence, date);
    let end = next_after(recurrence, date).and_then(|d| d.pred_opt());
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AppError::validation(format!("Date {} is out of range", date))),
    }
}

/// Amount per month equivalent to `amount_cents` per cadence period.
pub fn monthly_equivalent_cents(cadence: Cadence, amount_cents: i64) -> i64 {
    round_cents(Decimal::from(amount_cents) * Decimal::from(cadence.periods_per_year()) / Decimal::from(12))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_occurrences() {
        let rule = Recurrence::Weekly { weekday: Weekday::Mon };
        // 2025-01-01 is a Wednesday
        let dates = occurrences_between(&rule, date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        assert_eq!(
            dates,
            vec![date(2025, 1, 6), date(2025, 1, 13), date(2025, 1, 20), date(2025, 1, 27)]
        );
    }

    #[test]
    fn test_weekly_includes_window_edges() {
        let rule = Recurrence::Weekly { weekday: Weekday::Wed };
        let dates = occurrences_between(&rule, date(2025, 1, 1), date(2025, 1, 15)).unwrap();
        assert_eq!(dates, vec![date(2025, 1, 1), date(2025, 1, 8), date(2025, 1, 15)]);
    }

    #[test]
    fn test_fortnightly_keeps_parity_with_anchor() {
        let rule = Recurrence::Fortnightly {
            weekday: Weekday::Fri,
            anchor: date(2025, 1, 3),
        };
        let dates = occurrences_between(&rule, date(2025, 1, 5), date(2025, 2, 28)).unwrap();
        assert_eq!(
            dates,
            vec![date(2025, 1, 17), date(2025, 1, 31), date(2025, 2, 14), date(2025, 2, 28)]
        );
    }

    #[test]
    fn test_fortnightly_window_before_anchor() {
        let rule = Recurrence::Fortnightly {
            weekday: Weekday::Fri,
            anchor: date(2025, 1, 3),
        };
        let dates = occurrences_between(&rule, date(2024, 12, 1), date(2024, 12, 31)).unwrap();
        assert_eq!(dates, vec![date(2024, 12, 6), date(2024, 12, 20)]);
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let rule = Recurrence::Monthly { day_of_month: 31 };
        let dates = occurrences_between(&rule, date(2024, 1, 1), date(2024, 4, 30)).unwrap();
        assert_eq!(
            dates,
            vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]
        );
    }

    #[test]
    fn test_monthly_partial_months_at_window_edges() {
        let rule = Recurrence::Monthly { day_of_month: 15 };
        let dates = occurrences_between(&rule, date(2025, 1, 16), date(2025, 3, 14)).unwrap();
        assert_eq!(dates, vec![date(2025, 2, 15)]);
    }

    #[test]
    fn test_quarterly_occurrences() {
        let rule = Recurrence::Quarterly {
            month_of_quarter: 2,
            day_of_month: 10,
        };
        let dates = occurrences_between(&rule, date(2025, 1, 1), date(2025, 12, 31)).unwrap();
        assert_eq!(
            dates,
            vec![date(2025, 2, 10), date(2025, 5, 10), date(2025, 8, 10), date(2025, 11, 10)]
        );
    }

    #[test]
    fn test_yearly_leap_day_clamps() {
        let rule = Recurrence::Yearly {
            month: 2,
            day_of_month: 29,
        };
        let dates = occurrences_between(&rule, date(2023, 1, 1), date(2024, 12, 31)).unwrap();
        assert_eq!(dates, vec![date(2023, 2, 28), date(2024, 2, 29)]);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let rule = Recurrence::Monthly { day_of_month: 1 };
        let result = occurrences_between(&rule, date(2025, 2, 1), date(2025, 1, 1));
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_single_day_window() {
        let rule = Recurrence::Monthly { day_of_month: 1 };
        assert_eq!(
            occurrences_between(&rule, date(2025, 1, 1), date(2025, 1, 1)).unwrap(),
            vec![date(2025, 1, 1)]
        );
        assert!(occurrences_between(&rule, date(2025, 1, 2), date(2025, 1, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_period_containing_monthly() {
        let rule = Recurrence::Monthly { day_of_month: 25 };
        assert_eq!(
            period_containing(&rule, date(2025, 3, 10)).unwrap(),
            (date(2025, 2, 25), date(2025, 3, 24))
        );
        assert_eq!(
            period_containing(&rule, date(2025, 3, 25)).unwrap(),
            (date(2025, 3, 25), date(2025, 4, 24))
        );
    }

    #[test]
    fn test_period_containing_weekly_and_fortnightly() {
        let weekly = Recurrence::Weekly { weekday: Weekday::Mon };
        assert_eq!(
            period_containing(&weekly, date(2025, 1, 1)).unwrap(),
            (date(2024, 12, 30), date(2025, 1, 5))
        );

        let fortnightly = Recurrence::Fortnightly {
            weekday: Weekday::Fri,
            anchor: date(2025, 1, 3),
        };
        assert_eq!(
            period_containing(&fortnightly, date(2025, 1, 20)).unwrap(),
            (date(2025, 1, 17), date(2025, 1, 30))
        );
    }

    #[test]
    fn test_period_containing_yearly() {
        let rule = Recurrence::Yearly {
            month: 7,
            day_of_month: 1,
        };
        assert_eq!(
            period_containing(&rule, date(2025, 3, 1)).unwrap(),
            (date(2024, 7, 1), date(2025, 6, 30))
        );
    }

    #[test]
    fn test_next_after_skips_same_day() {
        let rule = Recurrence::Quarterly {
            month_of_quarter: 1,
            day_of_month: 1,
        };
        assert_eq!(next_after(&rule, date(2025, 1, 1)), Some(date(2025, 4, 1)));
        assert_eq!(previous_on_or_before(&rule, date(2025, 3, 31)), Some(date(2025, 1, 1)));
    }

    #[test]
    fn test_monthly_equivalent() {
        assert_eq!(monthly_equivalent_cents(Cadence::Weekly, 10000), 43333);
        assert_eq!(monthly_equivalent_cents(Cadence::Fortnightly, 12000), 26000);
        assert_eq!(monthly_equivalent_cents(Cadence::Monthly, 12345), 12345);
        assert_eq!(monthly_equivalent_cents(Cadence::Quarterly, 30000), 10000);
        assert_eq!(monthly_equivalent_cents(Cadence::Yearly, 100), 8);
    }
}
