//! Billing-cycle arithmetic and card status derivation.
//!
//! A cycle opens on the statement day and must be settled by the due day.
//! When the due day is numerically before the statement day the due date
//! falls in the following month. Days past the end of a month clamp to its
//! last day (statement day 31 in February is the 28th or 29th). When clamping
//! puts a due date on the next statement day, the next cycle opens the day
//! after, so a payment on the due date always settles the cycle it is due for.
//!
//! The current cycle is the one whose opening day is the latest on or before
//! today, so an unpaid card stays overdue until its next statement.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use billbook_core::{LedgerError, LedgerResult};

use crate::card::{CardStatus, CreditCard};

/// Dates of the billing cycle a given day falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    pub statement: NaiveDate,
    pub due: NaiveDate,
    /// Opening day of the following cycle (exclusive end of this one).
    /// Always after `due`.
    pub next_statement: NaiveDate,
}

impl BillingCycle {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.statement <= day && day < self.next_statement
    }
}

/// The cycle that is current on `today` for `card`.
pub fn billing_cycle(card: &CreditCard, today: NaiveDate) -> LedgerResult<BillingCycle> {
    cycle_for_days(card.statement_day(), card.payment_due_day(), today)
}

fn cycle_for_days(statement_day: u8, due_day: u8, today: NaiveDate) -> LedgerResult<BillingCycle> {
    let days = CycleDays {
        statement: statement_day,
        due: due_day,
    };
    let this_month = first_of_month(today)?;
    let month = if today >= days.opening(this_month)? {
        this_month
    } else {
        shift(this_month, -1)?
    };

    Ok(BillingCycle {
        statement: days.opening(month)?,
        due: days.due(month)?,
        next_statement: days.opening(shift(month, 1)?)?,
    })
}

/// Statement and due days of a card, resolved against a statement month.
#[derive(Debug, Clone, Copy)]
struct CycleDays {
    statement: u8,
    due: u8,
}

impl CycleDays {
    fn due(self, month: NaiveDate) -> LedgerResult<NaiveDate> {
        let due_month = if self.due >= self.statement {
            month
        } else {
            shift(month, 1)?
        };
        clamp_day(due_month, self.due)
    }

    /// First day of the cycle whose statement falls in `month`.
    fn opening(self, month: NaiveDate) -> LedgerResult<NaiveDate> {
        let statement = clamp_day(month, self.statement)?;
        let previous_due = self.due(shift(month, -1)?)?;
        if previous_due < statement {
            Ok(statement)
        } else {
            previous_due.succ_opt().ok_or_else(|| out_of_range(previous_due))
        }
    }
}

/// Current status of a card on `today`.
///
/// A payment inside the cycle wins; otherwise the card is overdue after the
/// due date, needs cycling from the statement date on, and is not yet due
/// before it.
pub fn derive_status(cycle: &BillingCycle, today: NaiveDate, has_cycle_payment: bool) -> CardStatus {
    if has_cycle_payment {
        CardStatus::Cycled
    } else if today > cycle.due {
        CardStatus::Overdue
    } else if today >= cycle.statement {
        CardStatus::NeedsCycling
    } else {
        CardStatus::NotDue
    }
}

/// Whether a payment made at `paid_at` settles `cycle`: anything from the
/// statement date up to and including the due date, and on until the next
/// cycle opens.
pub fn covers_cycle(cycle: &BillingCycle, paid_at: DateTime<Utc>) -> bool {
    cycle.contains(paid_at.date_naive())
}

fn first_of_month(day: NaiveDate) -> LedgerResult<NaiveDate> {
    day.with_day(1).ok_or_else(|| out_of_range(day))
}

fn shift(month: NaiveDate, delta: i32) -> LedgerResult<NaiveDate> {
    let months = Months::new(delta.unsigned_abs());
    let shifted = if delta >= 0 {
        month.checked_add_months(months)
    } else {
        month.checked_sub_months(months)
    };
    shifted.ok_or_else(|| out_of_range(month))
}

fn days_in_month(month: NaiveDate) -> LedgerResult<u32> {
    let last = shift(month, 1)?.pred_opt().ok_or_else(|| out_of_range(month))?;
    Ok(last.day())
}

fn clamp_day(month: NaiveDate, day: u8) -> LedgerResult<NaiveDate> {
    let day = u32::from(day).min(days_in_month(month)?);
    month.with_day(day).ok_or_else(|| out_of_range(month))
}

fn out_of_range(day: NaiveDate) -> LedgerError {
    LedgerError::validation(format!("date {day} is outside the supported calendar range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn statement_first_due_fifteenth_on_the_twentieth_is_overdue() {
        let today = date(2025, 4, 20);
        let cycle = cycle_for_days(1, 15, today).unwrap();
        assert_eq!(cycle.statement, date(2025, 4, 1));
        assert_eq!(cycle.due, date(2025, 4, 15));
        assert_eq!(derive_status(&cycle, today, false), CardStatus::Overdue);
        assert_eq!(derive_status(&cycle, today, true), CardStatus::Cycled);
    }

    #[test]
    fn window_between_statement_and_due_needs_cycling() {
        let today = date(2025, 4, 10);
        let cycle = cycle_for_days(5, 25, today).unwrap();
        assert_eq!(derive_status(&cycle, today, false), CardStatus::NeedsCycling);

        // Before the 5th the March cycle is still current and its due date is gone.
        let early = date(2025, 4, 3);
        let cycle = cycle_for_days(5, 25, early).unwrap();
        assert_eq!(cycle.statement, date(2025, 3, 5));
        assert_eq!(cycle.due, date(2025, 3, 25));
        assert_eq!(derive_status(&cycle, early, false), CardStatus::Overdue);
        assert_eq!(derive_status(&cycle, early, true), CardStatus::Cycled);
    }

    #[test]
    fn day_before_statement_is_not_due() {
        let cycle = BillingCycle {
            statement: date(2025, 5, 5),
            due: date(2025, 5, 25),
            next_statement: date(2025, 6, 5),
        };
        assert_eq!(derive_status(&cycle, date(2025, 5, 4), false), CardStatus::NotDue);
    }

    #[test]
    fn due_before_statement_rolls_into_next_month() {
        // Statement on the 25th, due on the 10th of the following month.
        let today = date(2025, 4, 28);
        let cycle = cycle_for_days(25, 10, today).unwrap();
        assert_eq!(cycle.statement, date(2025, 4, 25));
        assert_eq!(cycle.due, date(2025, 5, 10));
        assert_eq!(derive_status(&cycle, today, false), CardStatus::NeedsCycling);

        // On the 5th the cycle that opened in March is still running.
        let today = date(2025, 4, 5);
        let cycle = cycle_for_days(25, 10, today).unwrap();
        assert_eq!(cycle.statement, date(2025, 3, 25));
        assert_eq!(cycle.due, date(2025, 4, 10));
        assert_eq!(cycle.next_statement, date(2025, 4, 25));
        assert_eq!(derive_status(&cycle, today, false), CardStatus::NeedsCycling);
    }

    #[test]
    fn rolled_over_due_date_passing_unpaid_is_overdue() {
        let today = date(2025, 4, 15);
        let cycle = cycle_for_days(25, 10, today).unwrap();
        assert_eq!(cycle.statement, date(2025, 3, 25));
        assert_eq!(cycle.due, date(2025, 4, 10));
        assert_eq!(derive_status(&cycle, today, false), CardStatus::Overdue);

        // Stays overdue up to the day before the next statement.
        let eve = date(2025, 4, 24);
        let cycle = cycle_for_days(25, 10, eve).unwrap();
        assert_eq!(cycle.statement, date(2025, 3, 25));
        assert_eq!(derive_status(&cycle, eve, false), CardStatus::Overdue);
    }

    #[test]
    fn days_clamp_to_month_length() {
        let today = date(2025, 2, 28);
        let cycle = cycle_for_days(31, 31, today).unwrap();
        assert_eq!(cycle.statement, date(2025, 2, 28));
        assert_eq!(cycle.due, date(2025, 2, 28));
        assert_eq!(cycle.next_statement, date(2025, 3, 31));

        let leap = cycle_for_days(30, 31, date(2024, 2, 29)).unwrap();
        assert_eq!(leap.statement, date(2024, 2, 29));
        assert_eq!(leap.due, date(2024, 2, 29));

        // Earlier in February the January cycle is still current.
        let cycle = cycle_for_days(31, 31, date(2025, 2, 10)).unwrap();
        assert_eq!(cycle.statement, date(2025, 1, 31));
        assert_eq!(cycle.next_statement, date(2025, 2, 28));
    }

    #[test]
    fn payment_on_clamped_due_date_settles_its_cycle() {
        // Statement 31, due 30: in April both clamp to the 30th.
        let at = |d: NaiveDate| d.and_hms_opt(10, 0, 0).unwrap().and_utc();
        let today = date(2025, 4, 30);
        let cycle = cycle_for_days(31, 30, today).unwrap();
        assert_eq!(cycle.statement, date(2025, 3, 31));
        assert_eq!(cycle.due, date(2025, 4, 30));
        assert_eq!(cycle.next_statement, date(2025, 5, 1));
        assert!(covers_cycle(&cycle, at(today)));
        assert_eq!(derive_status(&cycle, today, false), CardStatus::NeedsCycling);

        let next = cycle_for_days(31, 30, date(2025, 5, 1)).unwrap();
        assert_eq!(next.statement, date(2025, 5, 1));
        assert_eq!(next.due, date(2025, 5, 30));
        assert!(!covers_cycle(&next, at(today)));

        // February: both days clamp to the 28th.
        let feb = date(2025, 2, 28);
        let cycle = cycle_for_days(31, 30, feb).unwrap();
        assert_eq!(cycle.statement, date(2025, 1, 31));
        assert_eq!(cycle.due, feb);
        assert_eq!(cycle.next_statement, date(2025, 3, 1));
        assert!(covers_cycle(&cycle, at(feb)));

        let march = cycle_for_days(31, 30, date(2025, 3, 1)).unwrap();
        assert_eq!(march.statement, date(2025, 3, 1));
        assert_eq!(march.due, date(2025, 3, 30));
        assert_eq!(march.next_statement, date(2025, 3, 31));
    }

    #[test]
    fn december_rolls_into_january() {
        let cycle = cycle_for_days(20, 5, date(2025, 12, 22)).unwrap();
        assert_eq!(cycle.due, date(2026, 1, 5));
        assert_eq!(cycle.next_statement, date(2026, 1, 20));
    }

    #[test]
    fn coverage_is_half_open() {
        let cycle = cycle_for_days(1, 15, date(2025, 4, 20)).unwrap();
        let at = |d: NaiveDate| d.and_hms_opt(9, 0, 0).unwrap().and_utc();
        assert!(covers_cycle(&cycle, at(date(2025, 4, 1))));
        assert!(covers_cycle(&cycle, at(date(2025, 4, 30))));
        assert!(!covers_cycle(&cycle, at(date(2025, 3, 31))));
        assert!(!covers_cycle(&cycle, at(date(2025, 5, 1))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: today lies in its cycle, the due date is inside it, and
        /// the next cycle opens exactly where this one ends.
        #[test]
        fn cycle_is_well_formed(
            statement in 1u8..=31,
            due in 1u8..=31,
            offset in 0i64..3650,
        ) {
            let today = date(2020, 1, 1) + chrono::Duration::days(offset);
            let cycle = cycle_for_days(statement, due, today).unwrap();

            prop_assert!(cycle.contains(today));
            prop_assert!(cycle.statement <= cycle.due);
            prop_assert!(cycle.due < cycle.next_statement);

            let next = cycle_for_days(statement, due, cycle.next_statement).unwrap();
            prop_assert_eq!(next.statement, cycle.next_statement);
        }
    }
}
