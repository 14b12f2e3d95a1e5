//! Contracts for the data a trial balance is computed from, and the adapter
//! that pulls ledger-source results once per report.
//!
//! Sign conventions differ between the two ledger views:
//! - [`LedgerSource`] balances are credit-positive, like report rows.
//! - [`RawLedgerEntries::sum_balance`] returns the journal-item signed
//!   balance, `debit - credit`.

use crate::error::Result;
use crate::schema::{
    AccountId, CompanyId, CurrencyId, GroupId, JournalId, PartnerId, ReportRequest,
};
use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub company_id: CompanyId,
    pub code: String,
    pub name: String,
    pub group_id: Option<GroupId>,
    pub currency_id: Option<CurrencyId>,
    /// False for P&L accounts, whose balance is not carried across fiscal years.
    pub include_initial_balance: bool,
}

impl AccountRecord {
    pub fn new(
        id: AccountId,
        company_id: CompanyId,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            company_id,
            code: code.into(),
            name: name.into(),
            group_id: None,
            currency_id: None,
            include_initial_balance: true,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_currency(mut self, currency_id: CurrencyId) -> Self {
        self.currency_id = Some(currency_id);
        self
    }

    /// Marks the account as income/expense.
    pub fn profit_and_loss(mut self) -> Self {
        self.include_initial_balance = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub company_id: CompanyId,
    pub parent_id: Option<GroupId>,
    pub code_prefix: Option<String>,
    pub name: String,
    /// Nested-set left bound of the group in its tree.
    pub parent_left: i64,
    /// Depth in the group tree, 0 for roots.
    pub level: u32,
    /// Accounts designated as members of this group.
    #[serde(default)]
    pub compute_account_ids: BTreeSet<AccountId>,
}

impl GroupRecord {
    pub fn new(
        id: GroupId,
        company_id: CompanyId,
        name: impl Into<String>,
        parent_left: i64,
        level: u32,
    ) -> Self {
        Self {
            id,
            company_id,
            parent_id: None,
            code_prefix: None,
            name: name.into(),
            parent_left,
            level,
            compute_account_ids: BTreeSet::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.code_prefix = Some(prefix.into());
        self
    }

    pub fn with_parent(mut self, parent_id: GroupId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = AccountId>) -> Self {
        self.compute_account_ids.extend(members);
        self
    }

    /// The prefix, ignoring blank values.
    pub fn prefix(&self) -> Option<&str> {
        self.code_prefix
            .as_deref()
            .filter(|prefix| !prefix.trim().is_empty())
    }
}

/// Filters handed to the ledger source for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerFilters {
    pub company_id: CompanyId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub fy_start_date: NaiveDate,
    pub only_posted_moves: bool,
    pub hide_account_at_0: bool,
    pub foreign_currency: bool,
    pub partner_ids: BTreeSet<PartnerId>,
    pub journal_ids: BTreeSet<JournalId>,
    pub with_line_details: bool,
    pub with_partners: bool,
}

impl LedgerFilters {
    pub fn from_request(request: &ReportRequest) -> Self {
        Self {
            company_id: request.company_id,
            date_from: request.date_from,
            date_to: request.date_to,
            fy_start_date: request.fy_start_date,
            only_posted_moves: request.only_posted_moves,
            hide_account_at_0: request.hide_account_at_0,
            foreign_currency: request.foreign_currency,
            partner_ids: request.filter_partner_ids.clone(),
            journal_ids: request.filter_journal_ids.clone(),
            with_line_details: false,
            with_partners: request.show_partner_details,
        }
    }
}

/// Per-partner slice of one ledger account.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerPartnerBalance {
    pub partner_id: Option<PartnerId>,
    pub name: String,
    pub initial_balance: Decimal,
    pub initial_balance_foreign_currency: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub final_balance: Decimal,
    pub final_balance_foreign_currency: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccountBalance {
    pub account_id: AccountId,
    pub code: String,
    pub currency_id: Option<CurrencyId>,
    pub initial_balance: Decimal,
    pub initial_balance_foreign_currency: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub final_balance: Decimal,
    pub final_balance_foreign_currency: Decimal,
    /// Only filled when partners were requested.
    #[serde(default)]
    pub partners: Vec<LedgerPartnerBalance>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerReport {
    pub accounts: BTreeMap<AccountId, LedgerAccountBalance>,
}

/// Pre-aggregated general-ledger balances for a period.
pub trait LedgerSource: Send + Sync {
    fn compute(&self, account_ids: &BTreeSet<AccountId>, filters: &LedgerFilters)
        -> Result<LedgerReport>;
}

pub trait AccountMaster: Send + Sync {
    fn accounts_for_company(&self, company_id: CompanyId) -> Result<Vec<AccountRecord>>;

    fn accounts_by_ids(&self, ids: &BTreeSet<AccountId>) -> Result<Vec<AccountRecord>>;

    /// Accounts whose type excludes carrying an opening balance.
    fn pl_account_ids(&self, company_id: CompanyId) -> Result<BTreeSet<AccountId>>;

    fn unaffected_earnings_account(&self, company_id: CompanyId) -> Result<Option<AccountRecord>>;
}

pub trait GroupMaster: Send + Sync {
    fn groups_for_company(&self, company_id: CompanyId) -> Result<Vec<GroupRecord>>;
}

/// Upper bound of an entry date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodEnd {
    Inclusive(NaiveDate),
    Exclusive(NaiveDate),
}

impl PeriodEnd {
    pub fn admits(&self, date: NaiveDate) -> bool {
        match *self {
            PeriodEnd::Inclusive(end) => date <= end,
            PeriodEnd::Exclusive(end) => date < end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryQuery {
    pub company_id: CompanyId,
    pub account_ids: BTreeSet<AccountId>,
    pub date_from: NaiveDate,
    pub date_to: PeriodEnd,
    pub only_posted: bool,
}

impl EntryQuery {
    pub fn admits_date(&self, date: NaiveDate) -> bool {
        date >= self.date_from && self.date_to.admits(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebitCredit {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Read-only sums over raw journal items. Empty selections sum to zero.
pub trait RawLedgerEntries: Send + Sync {
    fn sum_debit_credit(&self, query: &EntryQuery) -> Result<DebitCredit>;

    /// Sum of `debit - credit`.
    fn sum_balance(&self, query: &EntryQuery) -> Result<Decimal>;
}

/// The collaborators one report run reads from.
#[derive(Clone, Copy)]
pub struct DataSources<'a> {
    pub ledger: &'a dyn LedgerSource,
    pub accounts: &'a dyn AccountMaster,
    pub groups: &'a dyn GroupMaster,
    pub entries: &'a dyn RawLedgerEntries,
}

impl<'a> DataSources<'a> {
    /// Uses one backend for every interface.
    pub fn from_backend<B>(backend: &'a B) -> Self
    where
        B: LedgerSource + AccountMaster + GroupMaster + RawLedgerEntries,
    {
        Self {
            ledger: backend,
            accounts: backend,
            groups: backend,
            entries: backend,
        }
    }

    pub fn with_ledger(self, ledger: &'a dyn LedgerSource) -> Self {
        Self { ledger, ..self }
    }
}

/// Ledger-source output cached for the lifetime of one report tree.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    report: LedgerReport,
    by_code: BTreeMap<String, Vec<AccountId>>,
}

impl LedgerSnapshot {
    /// Calls the ledger source exactly once. Failures propagate unchanged.
    pub fn fetch(
        ledger: &dyn LedgerSource,
        account_ids: &BTreeSet<AccountId>,
        filters: &LedgerFilters,
    ) -> Result<Self> {
        let report = ledger.compute(account_ids, filters)?;
        debug!(
            "Ledger source returned {} account balances for {} requested accounts",
            report.accounts.len(),
            account_ids.len()
        );
        Ok(Self::from_report(report))
    }

    pub fn from_report(report: LedgerReport) -> Self {
        let mut by_code: BTreeMap<String, Vec<AccountId>> = BTreeMap::new();
        for (id, account) in &report.accounts {
            by_code.entry(account.code.clone()).or_default().push(*id);
        }
        Self { report, by_code }
    }

    pub fn account(&self, account_id: AccountId) -> Option<&LedgerAccountBalance> {
        self.report.accounts.get(&account_id)
    }

    /// All ledger accounts sharing `code`, in account id order.
    pub fn accounts_by_code(&self, code: &str) -> impl Iterator<Item = &LedgerAccountBalance> {
        self.by_code
            .get(code)
            .into_iter()
            .flatten()
            .filter_map(|id| self.report.accounts.get(id))
    }

    pub fn len(&self) -> usize {
        self.report.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.report.accounts.is_empty()
    }
}
