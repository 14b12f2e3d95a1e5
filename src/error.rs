use chrono::NaiveDate;
use thiserror::Error;

use crate::schema::GroupId;

#[derive(Error, Debug)]
pub enum TrialBalanceError {
    #[error("Invalid date range: date_from {date_from} is after date_to {date_to}")]
    InvalidDateRange {
        date_from: NaiveDate,
        date_to: NaiveDate,
    },

    #[error("Invalid fiscal year start {fy_start_date}: must not be after date_from {date_from}")]
    InvalidFiscalYearStart {
        fy_start_date: NaiveDate,
        date_from: NaiveDate,
    },

    #[error("Invalid fiscal year end month {0}: must be between 1 and 12")]
    InvalidFiscalYearEndMonth(u32),

    #[error("Ledger source error: {0}")]
    LedgerSource(String),

    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Account group hierarchy contains a cycle through group {group_id}")]
    HierarchyCycle { group_id: GroupId },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrialBalanceError>;
