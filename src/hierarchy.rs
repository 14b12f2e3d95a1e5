//! Account-group rows and the two rollup strategies.

use crate::error::{Result, TrialBalanceError};
use crate::report::{Balances, GroupRow, ReportTree};
use crate::schema::{AccountId, GroupId, HierarchyMode};
use crate::source::GroupRecord;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Multiplier applied to a group's nested-set left bound to get its
/// sequence. Leaves room for up to 100000 rows between two successive
/// groups without resequencing.
pub const GROUP_SEQUENCE_STRIDE: i64 = 100_000;

/// Materializes every group as a report row with no balances yet.
pub fn build_group_rows(groups: &[GroupRecord]) -> Result<Vec<GroupRow>> {
    groups
        .iter()
        .map(|group| {
            Ok(GroupRow {
                group_id: group.id,
                parent_id: group.parent_id,
                code: group
                    .prefix()
                    .map(str::to_string)
                    .unwrap_or_else(|| group.name.clone()),
                code_prefix: group.prefix().map(str::to_string),
                name: group.name.clone(),
                sequence: group_sequence(group)?,
                level: group.level,
                balances: None,
                child_account_ids: BTreeSet::new(),
                compute_account_ids: BTreeSet::new(),
            })
        })
        .collect()
}

fn group_sequence(group: &GroupRecord) -> Result<i64> {
    group
        .parent_left
        .checked_mul(GROUP_SEQUENCE_STRIDE)
        .ok_or_else(|| {
            TrialBalanceError::DataAccess(format!(
                "Account group {} has an out of range tree left bound {}",
                group.id, group.parent_left
            ))
        })
}

/// Parent links between the group rows of one report.
#[derive(Debug, Clone, Default)]
pub struct GroupTree {
    parents: BTreeMap<GroupId, Option<GroupId>>,
}

impl GroupTree {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a GroupRow>) -> Self {
        Self {
            parents: rows
                .into_iter()
                .map(|row| (row.group_id, row.parent_id))
                .collect(),
        }
    }

    pub fn contains(&self, group_id: GroupId) -> bool {
        self.parents.contains_key(&group_id)
    }

    /// The group followed by all of its ancestors, root last. Unknown groups
    /// have no lineage; a parent link to an unknown group ends the chain.
    pub fn lineage(&self, group_id: GroupId) -> Result<Vec<GroupId>> {
        let mut lineage = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = Some(group_id);

        while let Some(id) = current {
            let Some(parent) = self.parents.get(&id) else {
                break;
            };
            if !seen.insert(id) {
                return Err(TrialBalanceError::HierarchyCycle { group_id: id });
            }
            lineage.push(id);
            current = *parent;
        }

        Ok(lineage)
    }
}

pub struct HierarchyAggregator {
    mode: HierarchyMode,
}

impl HierarchyAggregator {
    pub fn new(mode: HierarchyMode) -> Self {
        Self { mode }
    }

    pub fn aggregate(&self, tree: &mut ReportTree) -> Result<()> {
        match self.mode {
            HierarchyMode::Computed => aggregate_by_prefix(tree),
            HierarchyMode::Child => aggregate_by_parent(tree)?,
            HierarchyMode::None => {}
        }
        Ok(())
    }
}

/// Each group sums every account row whose code starts with the group's
/// code prefix, independently of the group's position in the tree.
pub fn aggregate_by_prefix(tree: &mut ReportTree) {
    let accounts: Vec<(String, Balances)> = tree
        .accounts()
        .map(|a| (a.code.clone(), a.balances))
        .collect();

    for group in tree.groups_mut() {
        let total: Balances = match group.code_prefix.as_deref() {
            Some(prefix) => accounts
                .iter()
                .filter(|(code, _)| code.starts_with(prefix))
                .map(|(_, balances)| balances)
                .sum(),
            None => Balances::default(),
        };
        group.balances = Some(total);
    }

    debug!("Aggregated {} accounts by code prefix", accounts.len());
}

/// Each group sums every account row below it through parent links, at
/// any depth, and records the closure of those account ids.
///
/// The P&L allocation row has no group of its own and is summed under the
/// group of the account it belongs to.
pub fn aggregate_by_parent(tree: &mut ReportTree) -> Result<()> {
    let group_tree = GroupTree::from_rows(tree.groups());

    let owners: BTreeMap<AccountId, GroupId> = tree
        .accounts()
        .filter(|a| !a.is_pl_allocation)
        .filter_map(|a| a.group_id.map(|group_id| (a.account_id, group_id)))
        .collect();

    let mut totals: BTreeMap<GroupId, Balances> = BTreeMap::new();
    let mut closures: BTreeMap<GroupId, BTreeSet<AccountId>> = BTreeMap::new();

    for account in tree.accounts() {
        let group_id = match account.group_id {
            Some(group_id) => group_id,
            None if account.is_pl_allocation => match owners.get(&account.account_id) {
                Some(&group_id) => group_id,
                None => continue,
            },
            None => continue,
        };
        for ancestor in group_tree.lineage(group_id)? {
            *totals.entry(ancestor).or_default() += &account.balances;
            closures.entry(ancestor).or_default().insert(account.account_id);
        }
    }

    for group in tree.groups_mut() {
        group.balances = Some(totals.remove(&group.group_id).unwrap_or_default());
        group.child_account_ids = closures.remove(&group.group_id).unwrap_or_default();
    }

    Ok(())
}

/// Places every grouped account right after its group, one level deeper.
pub fn propagate_account_sequence(tree: &mut ReportTree) -> Result<()> {
    let positions: BTreeMap<GroupId, (i64, u32)> = tree
        .groups()
        .map(|g| (g.group_id, (g.sequence, g.level)))
        .collect();

    let mut orphans = 0;
    for account in tree.accounts_mut() {
        let Some(group_id) = account.group_id else {
            continue;
        };
        let Some(&(sequence, level)) = positions.get(&group_id) else {
            orphans += 1;
            continue;
        };
        let (Some(sequence), Some(level)) = (sequence.checked_add(1), level.checked_add(1)) else {
            return Err(TrialBalanceError::DataAccess(format!(
                "Account group {} is positioned out of range for account {}",
                group_id, account.code
            )));
        };
        account.sequence = sequence;
        account.level = level;
    }

    if orphans > 0 {
        warn!(
            "{} account rows reference account groups missing from the group master",
            orphans
        );
    }

    Ok(())
}

/// Fills each group's member accounts: the designated list for the
/// computed strategy, the aggregated closure for the child strategy.
pub fn assign_member_accounts(tree: &mut ReportTree, mode: HierarchyMode, groups: &[GroupRecord]) {
    let designated: BTreeMap<GroupId, &BTreeSet<AccountId>> = groups
        .iter()
        .map(|g| (g.id, &g.compute_account_ids))
        .collect();

    for group in tree.groups_mut() {
        group.compute_account_ids = match mode {
            HierarchyMode::Computed => designated
                .get(&group.group_id)
                .map(|ids| (*ids).clone())
                .unwrap_or_default(),
            HierarchyMode::Child => group.child_account_ids.clone(),
            HierarchyMode::None => BTreeSet::new(),
        };
    }
}

/// Without a hierarchy every account sits at the top level.
pub fn flatten_levels(tree: &mut ReportTree) {
    for account in tree.accounts_mut() {
        account.level = 0;
    }
}
