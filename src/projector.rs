use crate::error::Result;
use crate::report::{AccountRow, Balances, PartnerRow};
use crate::schema::{AccountId, ReportRequest};
use crate::source::{
    AccountMaster, AccountRecord, DebitCredit, EntryQuery, LedgerSnapshot, PeriodEnd,
    RawLedgerEntries,
};
use log::debug;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Turns ledger-source balances into one report row per in-scope account.
pub struct AccountProjector<'a> {
    snapshot: &'a LedgerSnapshot,
}

impl<'a> AccountProjector<'a> {
    pub fn new(snapshot: &'a LedgerSnapshot) -> Self {
        Self { snapshot }
    }

    /// Accounts the ledger source knows nothing about still get a zero row.
    pub fn project(&self, scope: &[AccountRecord]) -> Vec<AccountRow> {
        scope
            .iter()
            .map(|account| {
                let mut row =
                    AccountRow::new(account.id, account.code.clone(), account.name.clone());
                row.group_id = account.group_id;

                if let Some(ledger) = self.snapshot.account(account.id) {
                    row.currency_id = ledger.currency_id;
                    row.balances = Balances::from_positions(
                        ledger.initial_balance,
                        ledger.initial_balance_foreign_currency,
                        ledger.debit,
                        ledger.credit,
                        ledger.final_balance,
                        ledger.final_balance_foreign_currency,
                    );
                }

                row
            })
            .collect()
    }
}

/// What the P&L reallocation wrote into the report.
#[derive(Debug, Clone, PartialEq)]
pub struct PlAllocation {
    pub account_id: AccountId,
    /// Debit/credit of all P&L accounts over the period.
    pub period_totals: DebitCredit,
    /// P&L balance realized between the fiscal year start and `date_from`,
    /// in report sign.
    pub initial_balance: Decimal,
    pub period_balance: Decimal,
    pub final_balance: Decimal,
}

/// Moves current fiscal year P&L into the unaffected earnings account.
pub struct PlReallocator<'a> {
    request: &'a ReportRequest,
    accounts: &'a dyn AccountMaster,
    entries: &'a dyn RawLedgerEntries,
}

impl<'a> PlReallocator<'a> {
    pub fn new(
        request: &'a ReportRequest,
        accounts: &'a dyn AccountMaster,
        entries: &'a dyn RawLedgerEntries,
    ) -> Self {
        Self {
            request,
            accounts,
            entries,
        }
    }

    /// Rewrites the unaffected earnings row with P&L movements and appends
    /// its "(*)" allocation twin. Does nothing when the company has no
    /// unaffected earnings account or the account is out of scope.
    pub fn apply(
        &self,
        rows: &mut Vec<AccountRow>,
        scope: &BTreeSet<AccountId>,
    ) -> Result<Option<PlAllocation>> {
        let company_id = self.request.company_id;

        let Some(unaffected) = self.accounts.unaffected_earnings_account(company_id)? else {
            debug!(
                "Company {} has no unaffected earnings account, skipping P&L reallocation",
                company_id
            );
            return Ok(None);
        };

        if !scope.contains(&unaffected.id) {
            debug!(
                "Unaffected earnings account {} is outside the report scope, skipping P&L reallocation",
                unaffected.code
            );
            return Ok(None);
        }

        let pl_account_ids = self.accounts.pl_account_ids(company_id)?;

        let period_totals = self.entries.sum_debit_credit(&EntryQuery {
            company_id,
            account_ids: pl_account_ids.clone(),
            date_from: self.request.date_from,
            date_to: PeriodEnd::Inclusive(self.request.date_to),
            only_posted: self.request.only_posted_moves,
        })?;

        for row in rows.iter_mut().filter(|r| r.account_id == unaffected.id) {
            row.name = unaffected.name.clone();
            row.balances.debit = period_totals.debit;
            row.balances.credit = period_totals.credit;
        }

        // Journal-item balance is debit - credit; flip it into report sign.
        let prior_balance = self.entries.sum_balance(&EntryQuery {
            company_id,
            account_ids: pl_account_ids,
            date_from: self.request.fy_start_date,
            date_to: PeriodEnd::Exclusive(self.request.date_from),
            only_posted: self.request.only_posted_moves,
        })?;
        let initial_balance = -prior_balance;

        let period_balance = period_totals.credit - period_totals.debit;
        let final_balance = initial_balance + period_balance;

        let mut allocation_row = AccountRow::new(
            unaffected.id,
            unaffected.code.clone(),
            format!("{} (*)", unaffected.name),
        );
        allocation_row.is_pl_allocation = true;
        allocation_row.balances = Balances {
            initial_balance,
            initial_balance_foreign_currency: Decimal::ZERO,
            debit: period_totals.credit,
            credit: period_totals.debit,
            period_balance,
            final_balance,
            final_balance_foreign_currency: Decimal::ZERO,
        };
        rows.push(allocation_row);

        debug!(
            "Allocated P&L to {}: initial {}, period {}, final {}",
            unaffected.code, initial_balance, period_balance, final_balance
        );

        Ok(Some(PlAllocation {
            account_id: unaffected.id,
            period_totals,
            initial_balance,
            period_balance,
            final_balance,
        }))
    }
}

/// Attaches the ledger source's per-partner slices to matching account
/// rows. Rows are joined on account code.
pub fn attach_partner_rows(rows: &mut [AccountRow], snapshot: &LedgerSnapshot) -> usize {
    let mut attached = 0;

    // The allocation row shares its code with the unaffected earnings row but
    // carries allocated P&L, not ledger movements. Partner slices of the
    // ledger account would not sum to it, so it gets none.
    for row in rows.iter_mut().filter(|r| !r.is_pl_allocation) {
        let mut partners: Vec<PartnerRow> = snapshot
            .accounts_by_code(&row.code)
            .flat_map(|ledger| {
                ledger.partners.iter().map(move |p| PartnerRow {
                    partner_id: p.partner_id,
                    name: p.name.clone(),
                    currency_id: ledger.currency_id,
                    balances: Balances::from_positions(
                        p.initial_balance,
                        p.initial_balance_foreign_currency,
                        p.debit,
                        p.credit,
                        p.final_balance,
                        p.final_balance_foreign_currency,
                    ),
                })
            })
            .collect();

        sort_partner_rows(&mut partners);
        attached += partners.len();
        row.partners = partners;
    }

    attached
}

/// Named partners by name, "no partner allocated" last.
pub fn sort_partner_rows(partners: &mut [PartnerRow]) {
    partners.sort_by(|a, b| {
        a.partner_id
            .is_none()
            .cmp(&b.partner_id.is_none())
            .then_with(|| a.name.cmp(&b.name))
    });
}
