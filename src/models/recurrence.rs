use crate::error::{AppError, AppResult};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Weekly => "weekly",
            Cadence::Fortnightly => "fortnightly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Yearly => "yearly",
        }
    }

    pub fn periods_per_year(self) -> i64 {
        match self {
            Cadence::Weekly => 52,
            Cadence::Fortnightly => 26,
            Cadence::Monthly => 12,
            Cadence::Quarterly => 4,
            Cadence::Yearly => 1,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Cadence::Weekly),
            "fortnightly" | "biweekly" => Ok(Cadence::Fortnightly),
            "monthly" => Ok(Cadence::Monthly),
            "quarterly" => Ok(Cadence::Quarterly),
            "yearly" | "annually" => Ok(Cadence::Yearly),
            other => Err(AppError::validation(format!(
                "Invalid cadence '{}'. Use weekly, fortnightly, monthly, quarterly or yearly.",
                other
            ))),
        }
    }
}

/// A cadence together with the day-of-period selector that pins its
/// occurrences to the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cadence", rename_all = "lowercase")]
pub enum Recurrence {
    Weekly {
        weekday: Weekday,
    },
    /// `anchor` is one known occurrence; the others are whole fortnights away.
    Fortnightly {
        weekday: Weekday,
        anchor: NaiveDate,
    },
    Monthly {
        day_of_month: u32,
    },
    Quarterly {
        month_of_quarter: u32,
        day_of_month: u32,
    },
    Yearly {
        month: u32,
        day_of_month: u32,
    },
}

impl Recurrence {
    pub fn cadence(&self) -> Cadence {
        match self {
            Recurrence::Weekly { .. } => Cadence::Weekly,
            Recurrence::Fortnightly { .. } => Cadence::Fortnightly,
            Recurrence::Monthly { .. } => Cadence::Monthly,
            Recurrence::Quarterly { .. } => Cadence::Quarterly,
            Recurrence::Yearly { .. } => Cadence::Yearly,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let check_day = |day: u32| {
            if (1..=31).contains(&day) {
                Ok(())
            } else {
                Err(AppError::validation(format!(
                    "Day of month must be between 1 and 31, got {}",
                    day
                )))
            }
        };

        match *self {
            Recurrence::Weekly { .. } => Ok(()),
            Recurrence::Fortnightly { weekday, anchor } => {
                if anchor.weekday() != weekday {
                    return Err(AppError::validation(format!(
                        "Fortnightly anchor {} is not a {}",
                        anchor, weekday
                    )));
                }
                Ok(())
            }
            Recurrence::Monthly { day_of_month } => check_day(day_of_month),
            Recurrence::Quarterly {
                month_of_quarter,
                day_of_month,
            } => {
                if !(1..=3).contains(&month_of_quarter) {
                    return Err(AppError::validation(format!(
                        "Month of quarter must be between 1 and 3, got {}",
                        month_of_quarter
                    )));
                }
                check_day(day_of_month)
            }
            Recurrence::Yearly { month, day_of_month } => {
                if !(1..=12).contains(&month) {
                    return Err(AppError::validation(format!(
                        "Month must be between 1 and 12, got {}",
                        month
                    )));
                }
                check_day(day_of_month)
            }
        }
    }

    /// Builds a recurrence from the loose fields a form or CLI provides.
    /// Missing selectors default from `reference` (usually the start date).
    pub fn from_parts(
        cadence: Cadence,
        weekday: Option<Weekday>,
        day_of_month: Option<u32>,
        month: Option<u32>,
        reference: NaiveDate,
    ) -> AppResult<Self> {
        let recurrence = match cadence {
            Cadence::Weekly => Recurrence::Weekly {
                weekday: weekday.unwrap_or(reference.weekday()),
            },
            Cadence::Fortnightly => {
                let weekday = weekday.unwrap_or(reference.weekday());
                let mut anchor = reference;
                while anchor.weekday() != weekday {
                    anchor = anchor.succ_opt().ok_or_else(|| {
                        AppError::validation("Date out of range for fortnightly anchor")
                    })?;
                }
                Recurrence::Fortnightly { weekday, anchor }
            }
            Cadence::Monthly => Recurrence::Monthly {
                day_of_month: day_of_month.unwrap_or(reference.day()),
            },
            Cadence::Quarterly => Recurrence::Quarterly {
                month_of_quarter: month.unwrap_or(reference.month0() % 3 + 1),
                day_of_month: day_of_month.unwrap_or(reference.day()),
            },
            Cadence::Yearly => Recurrence::Yearly {
                month: month.unwrap_or(reference.month()),
                day_of_month: day_of_month.unwrap_or(reference.day()),
            },
        };
        recurrence.validate()?;
        Ok(recurrence)
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recurrence::Weekly { weekday } => write!(f, "weekly on {}", weekday),
            Recurrence::Fortnightly { weekday, anchor } => {
                write!(f, "fortnightly on {} (from {})", weekday, anchor)
            }
            Recurrence::Monthly { day_of_month } => write!(f, "monthly on day {}", day_of_month),
            Recurrence::Quarterly {
                month_of_quarter,
                day_of_month,
            } => write!(
                f,
                "quarterly on day {} of month {} of each quarter",
                day_of_month, month_of_quarter
            ),
            Recurrence::Yearly { month, day_of_month } => {
                write!(f, "yearly on {:02}-{:02}", month, day_of_month)
            }
        }
    }
}

pub fn parse_weekday(s: &str) -> AppResult<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| AppError::validation(format!("Invalid weekday '{}'", s.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_from_parts_defaults_from_reference() {
        let r = Recurrence::from_parts(Cadence::Monthly, None, None, None, date(2025, 3, 14)).unwrap();
        assert_eq!(r, Recurrence::Monthly { day_of_month: 14 });

        let r = Recurrence::from_parts(Cadence::Quarterly, None, None, None, date(2025, 5, 2)).unwrap();
        assert_eq!(
            r,
            Recurrence::Quarterly {
                month_of_quarter: 2,
                day_of_month: 2
            }
        );
    }

    #[test]
    fn test_fortnightly_anchor_moves_to_weekday() {
        // 2025-01-01 is a Wednesday
        let r = Recurrence::from_parts(
            Cadence::Fortnightly,
            Some(Weekday::Fri),
            None,
            None,
            date(2025, 1, 1),
        )
        .unwrap();
        assert_eq!(
            r,
            Recurrence::Fortnightly {
                weekday: Weekday::Fri,
                anchor: date(2025, 1, 3)
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_selectors() {
        assert!(Recurrence::Monthly { day_of_month: 0 }.validate().is_err());
        assert!(Recurrence::Monthly { day_of_month: 32 }.validate().is_err());
        assert!(Recurrence::Yearly { month: 13, day_of_month: 1 }.validate().is_err());
        assert!(
            Recurrence::Quarterly {
                month_of_quarter: 4,
                day_of_month: 1
            }
            .validate()
            .is_err()
        );
        assert!(
            Recurrence::Fortnightly {
                weekday: Weekday::Mon,
                anchor: date(2025, 1, 1)
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_parse_cadence_aliases() {
        assert_eq!("biweekly".parse::<Cadence>().unwrap(), Cadence::Fortnightly);
        assert_eq!("Annually".parse::<Cadence>().unwrap(), Cadence::Yearly);
        assert!("daily".parse::<Cadence>().is_err());
    }
}
