use crate::error::Result;
use crate::hierarchy::{
    assign_member_accounts, build_group_rows, flatten_levels, propagate_account_sequence,
    HierarchyAggregator,
};
use crate::projector::{attach_partner_rows, AccountProjector, PlReallocator};
use crate::report::ReportTree;
use crate::schema::{AccountId, ReportRequest};
use crate::source::{AccountRecord, DataSources, LedgerFilters, LedgerSnapshot};
use log::{debug, info};
use std::collections::BTreeSet;

/// Computes one trial-balance report. Each stage consumes the previous
/// stage's output in full:
/// ledger pull, account projection, partner projection, group rows,
/// aggregation, then sort and prune.
pub struct TrialBalanceEngine<'a> {
    request: &'a ReportRequest,
    sources: DataSources<'a>,
}

impl<'a> TrialBalanceEngine<'a> {
    pub fn new(request: &'a ReportRequest, sources: DataSources<'a>) -> Self {
        Self { request, sources }
    }

    pub fn compute(&self) -> Result<ReportTree> {
        let request = self.request;
        request.validate()?;

        info!(
            "Computing trial balance for company {} from {} to {} (hierarchy: {:?})",
            request.company_id, request.date_from, request.date_to, request.hierarchy_on
        );

        let scope = self.account_scope()?;
        if scope.is_empty() {
            debug!("No accounts in scope, returning an empty report");
            return Ok(ReportTree::default());
        }
        let scope_ids: BTreeSet<AccountId> = scope.iter().map(|a| a.id).collect();

        let snapshot = LedgerSnapshot::fetch(
            self.sources.ledger,
            &scope_ids,
            &LedgerFilters::from_request(request),
        )?;

        let mut accounts = AccountProjector::new(&snapshot).project(&scope);
        PlReallocator::new(request, self.sources.accounts, self.sources.entries)
            .apply(&mut accounts, &scope_ids)?;
        debug!("Projected {} account rows", accounts.len());

        if request.show_partner_details {
            let attached = attach_partner_rows(&mut accounts, &snapshot);
            debug!("Attached {} partner rows", attached);
        }

        let mut tree = ReportTree::from_accounts(accounts);

        if request.uses_hierarchy() {
            self.build_hierarchy(&mut tree)?;
        } else {
            flatten_levels(&mut tree);
        }

        tree.sort();

        if request.hide_account_at_0 {
            let removed = tree.hide_zero_accounts();
            debug!("Removed {} zero account rows", removed);
        }

        Ok(tree)
    }

    /// Explicitly filtered accounts, or every account of the company, in
    /// code order.
    fn account_scope(&self) -> Result<Vec<AccountRecord>> {
        let mut accounts = if self.request.has_account_filter() {
            self.sources
                .accounts
                .accounts_by_ids(&self.request.filter_account_ids)?
        } else {
            self.sources
                .accounts
                .accounts_for_company(self.request.company_id)?
        };

        accounts.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.id.cmp(&b.id)));
        accounts.dedup_by_key(|a| a.id);
        Ok(accounts)
    }

    fn build_hierarchy(&self, tree: &mut ReportTree) -> Result<()> {
        let mode = self.request.hierarchy_on;
        let groups = self
            .sources
            .groups
            .groups_for_company(self.request.company_id)?;

        for row in build_group_rows(&groups)? {
            tree.push_group(row);
        }
        debug!("Materialized {} account groups", groups.len());

        HierarchyAggregator::new(mode).aggregate(tree)?;
        propagate_account_sequence(tree)?;
        assign_member_accounts(tree, mode, &groups);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryLedger, JournalItem};
    use crate::schema::{CompanyId, GroupId, HierarchyMode};
    use crate::source::GroupRecord;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const COMPANY: CompanyId = CompanyId(1);

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new()
            .with_group(GroupRecord::new(GroupId(1), COMPANY, "Assets", 1, 0).with_prefix("5"))
            .with_account(
                AccountRecord::new(AccountId(1), COMPANY, "512", "Bank").in_group(GroupId(1)),
            )
            .with_account(
                AccountRecord::new(AccountId(2), COMPANY, "530", "Cash").in_group(GroupId(1)),
            )
            .with_item(JournalItem::new(date(2023, 1, 5), COMPANY, AccountId(1), dec!(10), dec!(0)))
    }

    fn request() -> ReportRequest {
        ReportRequest::new(COMPANY, date(2023, 1, 1), date(2023, 1, 31), 12).unwrap()
    }

    #[test]
    fn test_ledger_source_called_once() {
        let ledger = ledger();
        let request = request();
        let tree = TrialBalanceEngine::new(&request, DataSources::from_backend(&ledger))
            .compute()
            .unwrap();
        assert_eq!(ledger.ledger_calls(), 1);
        assert_eq!(tree.accounts().count(), 2);
        assert_eq!(tree.groups().count(), 1);
    }

    #[test]
    fn test_invalid_request_is_rejected_before_data_access() {
        let ledger = ledger();
        let mut request = request();
        request.date_to = date(2022, 12, 31);

        let result =
            TrialBalanceEngine::new(&request, DataSources::from_backend(&ledger)).compute();
        assert!(result.is_err());
        assert_eq!(ledger.ledger_calls(), 0);
    }

    #[test]
    fn test_filter_disables_groups_and_levels() {
        let ledger = ledger();
        let mut request = request();
        request.filter_account_ids.insert(AccountId(2));
        request.hierarchy_on = HierarchyMode::Child;

        let tree = TrialBalanceEngine::new(&request, DataSources::from_backend(&ledger))
            .compute()
            .unwrap();
        assert_eq!(tree.groups().count(), 0);
        assert_eq!(tree.len(), 1);
        assert!(tree.accounts().all(|a| a.level == 0 && a.sequence == 0));
    }

    #[test]
    fn test_hide_zero_after_sort() {
        let ledger = ledger();
        let mut request = request();
        request.hide_account_at_0 = true;

        let tree = TrialBalanceEngine::new(&request, DataSources::from_backend(&ledger))
            .compute()
            .unwrap();
        let codes: Vec<&str> = tree.lines.iter().map(|l| l.code()).collect();
        assert_eq!(codes, vec!["5", "512"]);
    }
}
