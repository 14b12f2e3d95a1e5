//! Rows of a trial-balance report and the ordered tree they live in.
//!
//! All balances follow the credit-positive report convention:
//! `period_balance = final_balance - initial_balance`.

use crate::error::Result;
use crate::schema::{AccountId, CurrencyId, GroupId, PartnerId};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::{Add, AddAssign};

/// Decimal places used when a report is handed to a presentation layer.
pub const PRESENTATION_DECIMALS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub initial_balance: Decimal,
    pub initial_balance_foreign_currency: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub period_balance: Decimal,
    pub final_balance: Decimal,
    pub final_balance_foreign_currency: Decimal,
}

impl Balances {
    /// Builds balances from opening/closing positions and period movements.
    /// The period balance is always derived from the closing and opening
    /// balances, never supplied separately.
    pub fn from_positions(
        initial_balance: Decimal,
        initial_balance_foreign_currency: Decimal,
        debit: Decimal,
        credit: Decimal,
        final_balance: Decimal,
        final_balance_foreign_currency: Decimal,
    ) -> Self {
        Self {
            initial_balance,
            initial_balance_foreign_currency,
            debit,
            credit,
            period_balance: final_balance - initial_balance,
            final_balance,
            final_balance_foreign_currency,
        }
    }

    /// True when opening balance, both movements and closing balance are zero.
    /// Foreign-currency balances are not considered.
    pub fn is_zero(&self) -> bool {
        self.initial_balance.is_zero()
            && self.debit.is_zero()
            && self.credit.is_zero()
            && self.final_balance.is_zero()
    }

    pub fn rounded(&self) -> Self {
        let round = |value: Decimal| {
            value.round_dp_with_strategy(
                PRESENTATION_DECIMALS,
                RoundingStrategy::MidpointAwayFromZero,
            )
        };

        Self {
            initial_balance: round(self.initial_balance),
            initial_balance_foreign_currency: round(self.initial_balance_foreign_currency),
            debit: round(self.debit),
            credit: round(self.credit),
            period_balance: round(self.period_balance),
            final_balance: round(self.final_balance),
            final_balance_foreign_currency: round(self.final_balance_foreign_currency),
        }
    }
}

impl AddAssign<&Balances> for Balances {
    fn add_assign(&mut self, other: &Balances) {
        self.initial_balance += other.initial_balance;
        self.initial_balance_foreign_currency += other.initial_balance_foreign_currency;
        self.debit += other.debit;
        self.credit += other.credit;
        self.period_balance += other.period_balance;
        self.final_balance += other.final_balance;
        self.final_balance_foreign_currency += other.final_balance_foreign_currency;
    }
}

impl Add for Balances {
    type Output = Balances;

    fn add(mut self, other: Balances) -> Balances {
        self += &other;
        self
    }
}

impl<'a> std::iter::Sum<&'a Balances> for Balances {
    fn sum<I: Iterator<Item = &'a Balances>>(iter: I) -> Balances {
        iter.fold(Balances::default(), |mut acc, b| {
            acc += b;
            acc
        })
    }
}

/// Balances of one account scoped to a single counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerRow {
    /// `None` stands for "no partner allocated".
    pub partner_id: Option<PartnerId>,
    pub name: String,
    pub currency_id: Option<CurrencyId>,
    #[serde(flatten)]
    pub balances: Balances,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    pub account_id: AccountId,
    /// Owning account group, captured at projection time.
    pub group_id: Option<GroupId>,
    pub code: String,
    pub name: String,
    pub currency_id: Option<CurrencyId>,
    #[serde(flatten)]
    pub balances: Balances,
    pub sequence: i64,
    pub level: u32,
    /// Set on the synthetic "(*)" row carrying the P&L allocated to the
    /// unaffected earnings account.
    #[serde(default)]
    pub is_pl_allocation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partners: Vec<PartnerRow>,
}

impl AccountRow {
    pub fn new(account_id: AccountId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id,
            group_id: None,
            code: code.into(),
            name: name.into(),
            currency_id: None,
            balances: Balances::default(),
            sequence: 0,
            level: 0,
            is_pl_allocation: false,
            partners: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: GroupId,
    pub parent_id: Option<GroupId>,
    /// Display code: the group's code prefix, or its name when it has none.
    pub code: String,
    /// Prefix used for matching account codes in the computed strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_prefix: Option<String>,
    pub name: String,
    pub sequence: i64,
    pub level: u32,
    /// `None` until the hierarchy aggregator has run.
    #[serde(flatten)]
    pub balances: Option<Balances>,
    /// Closure of account ids below this group (child strategy).
    #[serde(default)]
    pub child_account_ids: BTreeSet<AccountId>,
    /// Member accounts exposed for drill-down.
    #[serde(default)]
    pub compute_account_ids: BTreeSet<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "row_type", rename_all = "snake_case")]
pub enum ReportLine {
    Account(AccountRow),
    Group(GroupRow),
}

impl ReportLine {
    pub fn sequence(&self) -> i64 {
        match self {
            ReportLine::Account(row) => row.sequence,
            ReportLine::Group(row) => row.sequence,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ReportLine::Account(row) => &row.code,
            ReportLine::Group(row) => &row.code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ReportLine::Account(row) => &row.name,
            ReportLine::Group(row) => &row.name,
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            ReportLine::Account(row) => row.level,
            ReportLine::Group(row) => row.level,
        }
    }

    pub fn as_account(&self) -> Option<&AccountRow> {
        match self {
            ReportLine::Account(row) => Some(row),
            ReportLine::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupRow> {
        match self {
            ReportLine::Group(row) => Some(row),
            ReportLine::Account(_) => None,
        }
    }
}

/// The complete, ordered output of one computation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportTree {
    pub lines: Vec<ReportLine>,
}

impl ReportTree {
    pub fn from_accounts(accounts: Vec<AccountRow>) -> Self {
        Self {
            lines: accounts.into_iter().map(ReportLine::Account).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn push_group(&mut self, group: GroupRow) {
        self.lines.push(ReportLine::Group(group));
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountRow> {
        self.lines.iter().filter_map(ReportLine::as_account)
    }

    pub fn accounts_mut(&mut self) -> impl Iterator<Item = &mut AccountRow> {
        self.lines.iter_mut().filter_map(|line| match line {
            ReportLine::Account(row) => Some(row),
            ReportLine::Group(_) => None,
        })
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupRow> {
        self.lines.iter().filter_map(ReportLine::as_group)
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut GroupRow> {
        self.lines.iter_mut().filter_map(|line| match line {
            ReportLine::Group(row) => Some(row),
            ReportLine::Account(_) => None,
        })
    }

    pub fn group(&self, group_id: GroupId) -> Option<&GroupRow> {
        self.groups().find(|g| g.group_id == group_id)
    }

    /// Every row for an account: the unaffected earnings account has two.
    pub fn account_rows(&self, account_id: AccountId) -> Vec<&AccountRow> {
        self.accounts()
            .filter(|a| a.account_id == account_id)
            .collect()
    }

    /// Orders rows by (sequence, code, name). Groups sort before their
    /// members because members carry the group's sequence + 1.
    pub fn sort(&mut self) {
        self.lines.sort_by(|a, b| {
            a.sequence()
                .cmp(&b.sequence())
                .then_with(|| a.code().cmp(b.code()))
                .then_with(|| a.name().cmp(b.name()))
        });
    }

    /// Removes account rows with nothing to show. Group rows always stay.
    pub fn hide_zero_accounts(&mut self) -> usize {
        let before = self.lines.len();
        self.lines.retain(|line| match line {
            ReportLine::Account(row) => !row.balances.is_zero(),
            ReportLine::Group(_) => true,
        });
        before - self.lines.len()
    }

    /// Copy of the tree with every balance rounded for presentation.
    pub fn rounded(&self) -> ReportTree {
        let mut tree = self.clone();
        for line in tree.lines.iter_mut() {
            match line {
                ReportLine::Account(row) => {
                    row.balances = row.balances.rounded();
                    for partner in row.partners.iter_mut() {
                        partner.balances = partner.balances.rounded();
                    }
                }
                ReportLine::Group(row) => {
                    row.balances = row.balances.as_ref().map(Balances::rounded);
                }
            }
        }
        tree
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn group(id: u64, code: &str, sequence: i64) -> GroupRow {
        GroupRow {
            group_id: GroupId(id),
            parent_id: None,
            code: code.to_string(),
            code_prefix: Some(code.to_string()),
            name: format!("Group {}", code),
            sequence,
            level: 0,
            balances: None,
            child_account_ids: BTreeSet::new(),
            compute_account_ids: BTreeSet::new(),
        }
    }

    fn account(id: u64, code: &str, sequence: i64) -> AccountRow {
        let mut row = AccountRow::new(AccountId(id), code, format!("Account {}", code));
        row.sequence = sequence;
        row
    }

    #[test]
    fn test_from_positions_derives_period_balance() {
        let balances = Balances::from_positions(
            dec!(100),
            dec!(0),
            dec!(30),
            dec!(80),
            dec!(150),
            dec!(0),
        );
        assert_eq!(balances.period_balance, dec!(50));
        assert_eq!(balances.period_balance, balances.credit - balances.debit);
    }

    #[test]
    fn test_sort_puts_group_before_members() {
        let mut tree = ReportTree::from_accounts(vec![
            account(2, "B", 200002),
            account(1, "A", 200001),
        ]);
        tree.push_group(group(10, "G", 200000));
        tree.sort();

        let codes: Vec<&str> = tree.lines.iter().map(|l| l.code()).collect();
        assert_eq!(codes, vec!["G", "A", "B"]);
    }

    #[test]
    fn test_sort_ties_break_on_code_then_name() {
        let mut first = account(1, "100", 5);
        first.name = "Zeta".to_string();
        let mut second = account(2, "100", 5);
        second.name = "Alpha".to_string();
        let third = account(3, "090", 5);

        let mut tree = ReportTree::from_accounts(vec![first, second, third]);
        tree.sort();

        let names: Vec<&str> = tree.lines.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["Account 090", "Alpha", "Zeta"]);
    }

    #[test]
    fn test_hide_zero_accounts_keeps_groups_and_movements() {
        let zero = account(1, "100", 0);

        let mut debit_only = account(2, "200", 0);
        debit_only.balances.debit = dec!(10);

        let mut credit_only = account(3, "300", 0);
        credit_only.balances.credit = dec!(10);

        // Balanced movements with zero balances still show activity.
        let mut both = account(4, "400", 0);
        both.balances.debit = dec!(5);
        both.balances.credit = dec!(5);

        let mut tree = ReportTree::from_accounts(vec![zero, debit_only, credit_only, both]);
        tree.push_group(group(10, "1", 100000));

        let removed = tree.hide_zero_accounts();
        assert_eq!(removed, 1);
        assert_eq!(tree.groups().count(), 1);
        assert_eq!(tree.accounts().count(), 3);
        assert!(tree.accounts().all(|a| a.account_id != AccountId(1)));
    }

    #[test]
    fn test_hide_zero_ignores_foreign_currency() {
        let mut row = account(1, "100", 0);
        row.balances.final_balance_foreign_currency = dec!(3);

        let mut tree = ReportTree::from_accounts(vec![row]);
        assert_eq!(tree.hide_zero_accounts(), 1);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_rounded_only_at_presentation() {
        let mut row = account(1, "100", 0);
        row.balances.debit = dec!(0.005);
        row.balances.credit = dec!(0.004);
        row.partners.push(PartnerRow {
            partner_id: None,
            name: "None".to_string(),
            currency_id: None,
            balances: Balances {
                final_balance: dec!(1.235),
                ..Balances::default()
            },
        });

        let mut tree = ReportTree::from_accounts(vec![row]);
        let mut g = group(10, "1", 100000);
        g.balances = Some(Balances {
            final_balance: dec!(2.675),
            ..Balances::default()
        });
        tree.push_group(g);

        let rounded = tree.rounded();
        let account = rounded.accounts().next().unwrap();
        assert_eq!(account.balances.debit, dec!(0.01));
        assert_eq!(account.balances.credit, dec!(0.00));
        assert_eq!(account.partners[0].balances.final_balance, dec!(1.24));
        assert_eq!(
            rounded.groups().next().unwrap().balances.unwrap().final_balance,
            dec!(2.68)
        );

        // The source tree keeps unrounded values.
        assert_eq!(tree.accounts().next().unwrap().balances.debit, dec!(0.005));
    }

    #[test]
    fn test_json_preserves_field_names() {
        let mut tree = ReportTree::from_accounts(vec![account(1, "100", 0)]);
        tree.push_group(group(10, "1", 100000));

        let json = tree.to_json().unwrap();
        for field in [
            "initial_balance",
            "initial_balance_foreign_currency",
            "debit",
            "credit",
            "period_balance",
            "final_balance",
            "final_balance_foreign_currency",
            "\"row_type\": \"group\"",
            "\"row_type\": \"account\"",
        ] {
            assert!(json.contains(field), "missing {}", field);
        }
    }

    #[test]
    fn test_balances_sum() {
        let a = Balances {
            debit: dec!(1),
            final_balance: dec!(2),
            ..Balances::default()
        };
        let b = Balances {
            debit: dec!(3),
            final_balance: dec!(-1),
            ..Balances::default()
        };
        let total: Balances = [a, b].iter().sum();
        assert_eq!(total.debit, dec!(4));
        assert_eq!(total.final_balance, dec!(1));
        assert_eq!(a + b, total);
    }
}
