//! In-memory backend computing every report input from a list of journal
//! items. Handy for tests and for embedding the engine without a database.

use crate::error::{Result, TrialBalanceError};
use crate::schema::{AccountId, CompanyId, GroupId, JournalId, PartnerId};
use crate::source::{
    AccountMaster, AccountRecord, DebitCredit, EntryQuery, GroupMaster, GroupRecord,
    LedgerAccountBalance, LedgerFilters, LedgerPartnerBalance, LedgerReport, LedgerSource,
    RawLedgerEntries,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const UNALLOCATED_PARTNER_NAME: &str = "No partner allocated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalItem {
    pub date: NaiveDate,
    pub company_id: CompanyId,
    pub account_id: AccountId,
    pub partner_id: Option<PartnerId>,
    pub journal_id: JournalId,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Amount in the account currency, credit-positive like report balances.
    pub amount_currency: Decimal,
    pub posted: bool,
}

impl JournalItem {
    pub fn new(
        date: NaiveDate,
        company_id: CompanyId,
        account_id: AccountId,
        debit: Decimal,
        credit: Decimal,
    ) -> Self {
        Self {
            date,
            company_id,
            account_id,
            partner_id: None,
            journal_id: JournalId(1),
            debit,
            credit,
            amount_currency: Decimal::ZERO,
            posted: true,
        }
    }

    pub fn with_partner(mut self, partner_id: PartnerId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_journal(mut self, journal_id: JournalId) -> Self {
        self.journal_id = journal_id;
        self
    }

    pub fn with_amount_currency(mut self, amount_currency: Decimal) -> Self {
        self.amount_currency = amount_currency;
        self
    }

    pub fn draft(mut self) -> Self {
        self.posted = false;
        self
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: BTreeMap<AccountId, AccountRecord>,
    groups: BTreeMap<GroupId, GroupRecord>,
    partners: BTreeMap<PartnerId, String>,
    items: Vec<JournalItem>,
    unaffected_earnings: BTreeMap<CompanyId, AccountId>,
    ledger_failure: Option<String>,
    ledger_calls: AtomicUsize,
}

/// Running totals for one account or partner slice.
#[derive(Default)]
struct Totals {
    seen: bool,
    initial_balance: Decimal,
    initial_foreign: Decimal,
    debit: Decimal,
    credit: Decimal,
    final_foreign: Decimal,
}

impl Totals {
    fn add_initial(&mut self, item: &JournalItem) {
        self.seen = true;
        self.initial_balance += item.credit - item.debit;
        self.initial_foreign += item.amount_currency;
        self.final_foreign += item.amount_currency;
    }

    fn add_period(&mut self, item: &JournalItem) {
        self.seen = true;
        self.debit += item.debit;
        self.credit += item.credit;
        self.final_foreign += item.amount_currency;
    }

    fn final_balance(&self) -> Decimal {
        self.initial_balance + self.credit - self.debit
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: AccountRecord) -> Self {
        self.accounts.insert(account.id, account);
        self
    }

    pub fn with_group(mut self, group: GroupRecord) -> Self {
        self.groups.insert(group.id, group);
        self
    }

    pub fn with_partner(mut self, partner_id: PartnerId, name: impl Into<String>) -> Self {
        self.partners.insert(partner_id, name.into());
        self
    }

    pub fn with_item(mut self, item: JournalItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = JournalItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn with_unaffected_earnings(
        mut self,
        company_id: CompanyId,
        account_id: AccountId,
    ) -> Self {
        self.unaffected_earnings.insert(company_id, account_id);
        self
    }

    /// Makes every ledger-source call fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.ledger_failure = Some(message.into());
        self
    }

    /// Number of ledger-source computations served so far.
    pub fn ledger_calls(&self) -> usize {
        self.ledger_calls.load(Ordering::SeqCst)
    }

    fn partner_name(&self, partner_id: Option<PartnerId>) -> String {
        match partner_id {
            Some(id) => self
                .partners
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("Partner {}", id)),
            None => UNALLOCATED_PARTNER_NAME.to_string(),
        }
    }

    fn passes_ledger_filters(&self, item: &JournalItem, filters: &LedgerFilters) -> bool {
        item.company_id == filters.company_id
            && (!filters.only_posted_moves || item.posted)
            && (filters.journal_ids.is_empty() || filters.journal_ids.contains(&item.journal_id))
            && (filters.partner_ids.is_empty()
                || item
                    .partner_id
                    .map(|p| filters.partner_ids.contains(&p))
                    .unwrap_or(false))
    }

    fn account_balance(
        &self,
        account: &AccountRecord,
        filters: &LedgerFilters,
    ) -> Option<LedgerAccountBalance> {
        let mut totals = Totals::default();
        let mut by_partner: BTreeMap<Option<PartnerId>, Totals> = BTreeMap::new();

        // P&L accounts restart at the fiscal year start.
        let opening_from = if account.include_initial_balance {
            None
        } else {
            Some(filters.fy_start_date)
        };

        for item in self.items.iter().filter(|item| {
            item.account_id == account.id
                && item.date <= filters.date_to
                && self.passes_ledger_filters(item, filters)
        }) {
            let partner = by_partner.entry(item.partner_id).or_default();
            if item.date >= filters.date_from {
                totals.add_period(item);
                partner.add_period(item);
            } else if opening_from.map(|from| item.date >= from).unwrap_or(true) {
                totals.add_initial(item);
                partner.add_initial(item);
            }
        }

        if !totals.seen {
            return None;
        }

        let foreign = filters.foreign_currency && account.currency_id.is_some();
        let foreign_or_zero = |value: Decimal| if foreign { value } else { Decimal::ZERO };

        let partners = if filters.with_partners {
            by_partner
                .into_iter()
                .filter(|(_, t)| t.seen)
                .map(|(partner_id, t)| LedgerPartnerBalance {
                    partner_id,
                    name: self.partner_name(partner_id),
                    initial_balance: t.initial_balance,
                    initial_balance_foreign_currency: foreign_or_zero(t.initial_foreign),
                    debit: t.debit,
                    credit: t.credit,
                    final_balance: t.final_balance(),
                    final_balance_foreign_currency: foreign_or_zero(t.final_foreign),
                })
                .collect()
        } else {
            Vec::new()
        };

        Some(LedgerAccountBalance {
            account_id: account.id,
            code: account.code.clone(),
            currency_id: if foreign { account.currency_id } else { None },
            initial_balance: totals.initial_balance,
            initial_balance_foreign_currency: foreign_or_zero(totals.initial_foreign),
            debit: totals.debit,
            credit: totals.credit,
            final_balance: totals.final_balance(),
            final_balance_foreign_currency: foreign_or_zero(totals.final_foreign),
            partners,
        })
    }

    fn raw_items<'a>(&'a self, query: &'a EntryQuery) -> impl Iterator<Item = &'a JournalItem> {
        self.items.iter().filter(move |item| {
            item.company_id == query.company_id
                && query.account_ids.contains(&item.account_id)
                && query.admits_date(item.date)
                && (!query.only_posted || item.posted)
        })
    }
}

impl LedgerSource for InMemoryLedger {
    fn compute(
        &self,
        account_ids: &BTreeSet<AccountId>,
        filters: &LedgerFilters,
    ) -> Result<LedgerReport> {
        self.ledger_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.ledger_failure {
            return Err(TrialBalanceError::LedgerSource(message.clone()));
        }

        let accounts = account_ids
            .iter()
            .filter_map(|id| self.accounts.get(id))
            .filter_map(|account| {
                self.account_balance(account, filters)
                    .map(|balance| (account.id, balance))
            })
            .collect();

        Ok(LedgerReport { accounts })
    }
}

impl AccountMaster for InMemoryLedger {
    fn accounts_for_company(&self, company_id: CompanyId) -> Result<Vec<AccountRecord>> {
        Ok(self
            .accounts
            .values()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect())
    }

    fn accounts_by_ids(&self, ids: &BTreeSet<AccountId>) -> Result<Vec<AccountRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.accounts.get(id))
            .cloned()
            .collect())
    }

    fn pl_account_ids(&self, company_id: CompanyId) -> Result<BTreeSet<AccountId>> {
        Ok(self
            .accounts
            .values()
            .filter(|a| a.company_id == company_id && !a.include_initial_balance)
            .map(|a| a.id)
            .collect())
    }

    fn unaffected_earnings_account(&self, company_id: CompanyId) -> Result<Option<AccountRecord>> {
        Ok(self
            .unaffected_earnings
            .get(&company_id)
            .and_then(|id| self.accounts.get(id))
            .cloned())
    }
}

impl GroupMaster for InMemoryLedger {
    fn groups_for_company(&self, company_id: CompanyId) -> Result<Vec<GroupRecord>> {
        let mut groups: Vec<GroupRecord> = self
            .groups
            .values()
            .filter(|g| g.company_id == company_id)
            .cloned()
            .collect();
        groups.sort_by_key(|g| (g.parent_left, g.id));
        Ok(groups)
    }
}

impl RawLedgerEntries for InMemoryLedger {
    fn sum_debit_credit(&self, query: &EntryQuery) -> Result<DebitCredit> {
        Ok(self
            .raw_items(query)
            .fold(DebitCredit::default(), |mut acc, item| {
                acc.debit += item.debit;
                acc.credit += item.credit;
                acc
            }))
    }

    fn sum_balance(&self, query: &EntryQuery) -> Result<Decimal> {
        Ok(self.raw_items(query).map(|item| item.debit - item.credit).sum())
    }
}
