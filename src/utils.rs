use crate::error::{Result, TrialBalanceError};
use chrono::{Datelike, NaiveDate};

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(TrialBalanceError::InvalidFiscalYearEndMonth(month));
    }
    Ok(())
}

/// First calendar month of a fiscal year ending in `fiscal_year_end_month`.
pub fn fiscal_year_start_month(fiscal_year_end_month: u32) -> u32 {
    if fiscal_year_end_month == 12 {
        1
    } else {
        fiscal_year_end_month + 1
    }
}

/// Get the first day of the fiscal year that `date` belongs to.
///
/// # Examples
/// - FY ends in Dec (12): 2023-05-10 -> 2023-01-01
/// - FY ends in June (6): 2023-05-10 -> 2022-07-01, 2023-08-10 -> 2023-07-01
pub fn fiscal_year_start_for_date(
    date: NaiveDate,
    fiscal_year_end_month: u32,
) -> Result<NaiveDate> {
    validate_fiscal_year_end_month(fiscal_year_end_month)?;

    let start_month = fiscal_year_start_month(fiscal_year_end_month);
    let start_year = if date.month() >= start_month {
        date.year()
    } else {
        date.year() - 1
    };

    NaiveDate::from_ymd_opt(start_year, start_month, 1).ok_or_else(|| {
        TrialBalanceError::InvalidFiscalYearEndMonth(fiscal_year_end_month)
    })
}
