//! # Trial Balance Builder
//!
//! Computes hierarchical trial-balance reports from pre-aggregated general
//! ledger data: opening balances, period debit/credit movements and closing
//! balances per account, optionally broken down by partner and rolled up
//! through an account-group hierarchy.
//!
//! ## Core Concepts
//!
//! - **Ledger Source**: external computation returning per-account (and per-partner)
//!   balances for a period. Called once per report.
//! - **P&L Reallocation**: current fiscal year income/expense is moved into the
//!   unaffected earnings account, shown twice: its own movements and a "(*)"
//!   allocation row.
//! - **Hierarchy**: groups aggregate accounts either by code prefix ("computed")
//!   or through parent links at any depth ("child").
//! - **Ordering**: rows sort by (sequence, code, name); a group's sequence is its
//!   nested-set left bound × 100000 and its accounts follow at sequence + 1.
//!
//! ## Example
//!
//! ```rust,ignore
//! use trial_balance_builder::*;
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let company = CompanyId(1);
//! let ledger = InMemoryLedger::new()
//!     .with_account(AccountRecord::new(AccountId(1), company, "512", "Bank"))
//!     .with_account(AccountRecord::new(AccountId(2), company, "700", "Sales").profit_and_loss())
//!     .with_item(JournalItem::new(
//!         NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
//!         company,
//!         AccountId(2),
//!         dec!(0),
//!         dec!(1500),
//!     ));
//!
//! let request = ReportRequest::new(
//!     company,
//!     NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
//!     12,
//! )
//! .unwrap();
//!
//! let report = compute_trial_balance(&request, DataSources::from_backend(&ledger)).unwrap();
//! println!("{}", report.rounded().to_json().unwrap());
//! ```

pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod projector;
pub mod report;
pub mod schema;
pub mod source;
pub mod utils;

pub use engine::TrialBalanceEngine;
pub use error::{Result, TrialBalanceError};
pub use hierarchy::{GroupTree, HierarchyAggregator, GROUP_SEQUENCE_STRIDE};
pub use memory::{InMemoryLedger, JournalItem, UNALLOCATED_PARTNER_NAME};
pub use projector::{AccountProjector, PlAllocation, PlReallocator};
pub use report::*;
pub use schema::*;
pub use source::*;
pub use utils::*;

use log::info;

pub struct TrialBalanceProcessor;

impl TrialBalanceProcessor {
    pub fn process(request: &ReportRequest, sources: DataSources<'_>) -> Result<ReportTree> {
        let tree = TrialBalanceEngine::new(request, sources).compute()?;

        info!(
            "Trial balance for company {} has {} accounts and {} groups",
            request.company_id,
            tree.accounts().count(),
            tree.groups().count()
        );

        Ok(tree)
    }

    /// Same as [`process`](Self::process), rounded for presentation.
    pub fn process_for_presentation(
        request: &ReportRequest,
        sources: DataSources<'_>,
    ) -> Result<ReportTree> {
        Ok(Self::process(request, sources)?.rounded())
    }
}

pub fn compute_trial_balance(
    request: &ReportRequest,
    sources: DataSources<'_>,
) -> Result<ReportTree> {
    TrialBalanceProcessor::process(request, sources)
}

pub fn compute_trial_balance_json(
    request: &ReportRequest,
    sources: DataSources<'_>,
) -> Result<String> {
    TrialBalanceProcessor::process_for_presentation(request, sources)?.to_json()
}
