//! Calendar arithmetic for chunk windows.

use chrono::{Months, NaiveDate, Utc};

/// The current day on the UTC calendar ERA5 publishes against.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// First and last day of a month.
pub fn month_window(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}

/// First and last day of a year.
pub fn year_window(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_take_today_from_utc_calendar() {
        let before = Utc::now().date_naive();
        let today = today();
        let after = Utc::now().date_naive();

        assert!(today == before || today == after);
    }

    #[test]
    fn should_wrap_months_across_years() {
        assert_eq!(previous_month(2024, 1), (2023, 12));
        assert_eq!(previous_month(2024, 7), (2024, 6));
        assert_eq!(next_month(2023, 12), (2024, 1));
    }

    #[test]
    fn should_make_month_window() {
        let (first, last) = month_window(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }
}
