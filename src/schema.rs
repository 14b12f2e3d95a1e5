use crate::error::{Result, TrialBalanceError};
use crate::utils::fiscal_year_start_for_date;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(AccountId, "Identifier of a ledger account.");
define_id!(GroupId, "Identifier of an account group.");
define_id!(PartnerId, "Identifier of a counterparty.");
define_id!(CurrencyId, "Identifier of a currency.");
define_id!(CompanyId, "Identifier of a company.");
define_id!(JournalId, "Identifier of a journal.");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyMode {
    #[default]
    #[schemars(
        description = "Computed Accounts: account groups carry code prefixes and aggregate every account whose code starts with that prefix."
    )]
    Computed,

    #[serde(alias = "relation")]
    #[schemars(
        description = "Child Accounts: account groups are hierarchical and aggregate every account below them through parent links."
    )]
    Child,

    #[schemars(description = "No hierarchy: display just the accounts, without any grouping.")]
    None,
}

impl HierarchyMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, HierarchyMode::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportRequest {
    #[schemars(description = "The company the report is computed for")]
    pub company_id: CompanyId,

    #[schemars(description = "First day of the reported period (inclusive), YYYY-MM-DD")]
    pub date_from: NaiveDate,

    #[schemars(description = "Last day of the reported period (inclusive), YYYY-MM-DD")]
    pub date_to: NaiveDate,

    #[schemars(
        description = "First day of the fiscal year containing date_from. P&L accounts restart their balance on this date."
    )]
    pub fy_start_date: NaiveDate,

    #[serde(default)]
    #[schemars(description = "Only take posted journal entries into account")]
    pub only_posted_moves: bool,

    #[serde(default)]
    #[schemars(
        description = "Remove account rows whose initial balance, debit, credit and final balance are all zero"
    )]
    pub hide_account_at_0: bool,

    #[serde(default)]
    #[schemars(description = "Carry balances in the account's foreign currency")]
    pub foreign_currency: bool,

    #[serde(default)]
    #[schemars(
        description = "Restrict the report to these accounts. Empty means every account of the company. A non-empty filter disables the group hierarchy."
    )]
    pub filter_account_ids: BTreeSet<AccountId>,

    #[serde(default)]
    #[schemars(description = "Restrict ledger data to these partners. Empty means all partners.")]
    pub filter_partner_ids: BTreeSet<PartnerId>,

    #[serde(default)]
    #[schemars(description = "Restrict ledger data to these journals. Empty means all journals.")]
    pub filter_journal_ids: BTreeSet<JournalId>,

    #[serde(default)]
    #[schemars(description = "Break every account down by partner")]
    pub show_partner_details: bool,

    #[serde(default)]
    #[schemars(description = "How account groups are rolled up")]
    pub hierarchy_on: HierarchyMode,
}

impl ReportRequest {
    /// Builds a request with default flags, deriving the fiscal year start
    /// from the company's fiscal year end month.
    pub fn new(
        company_id: CompanyId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        fiscal_year_end_month: u32,
    ) -> Result<Self> {
        let request = Self {
            company_id,
            date_from,
            date_to,
            fy_start_date: fiscal_year_start_for_date(date_from, fiscal_year_end_month)?,
            only_posted_moves: false,
            hide_account_at_0: false,
            foreign_currency: false,
            filter_account_ids: BTreeSet::new(),
            filter_partner_ids: BTreeSet::new(),
            filter_journal_ids: BTreeSet::new(),
            show_partner_details: false,
            hierarchy_on: HierarchyMode::default(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.date_from > self.date_to {
            return Err(TrialBalanceError::InvalidDateRange {
                date_from: self.date_from,
                date_to: self.date_to,
            });
        }

        if self.fy_start_date > self.date_from {
            return Err(TrialBalanceError::InvalidFiscalYearStart {
                fy_start_date: self.fy_start_date,
                date_from: self.date_from,
            });
        }

        Ok(())
    }

    pub fn has_account_filter(&self) -> bool {
        !self.filter_account_ids.is_empty()
    }

    /// Groups are only materialized for unfiltered reports with a hierarchy.
    pub fn uses_hierarchy(&self) -> bool {
        !self.has_account_filter() && self.hierarchy_on.is_enabled()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportRequest)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ReportRequest::schema_as_json().unwrap();
        assert!(schema_json.contains("date_from"));
        assert!(schema_json.contains("fy_start_date"));
        assert!(schema_json.contains("hierarchy_on"));
        assert!(schema_json.contains("filter_account_ids"));
    }

    #[test]
    fn test_new_derives_fiscal_year_start() {
        let request =
            ReportRequest::new(CompanyId(1), date(2023, 3, 1), date(2023, 3, 31), 6).unwrap();
        assert_eq!(request.fy_start_date, date(2022, 7, 1));
        assert_eq!(request.hierarchy_on, HierarchyMode::Computed);
        assert!(request.uses_hierarchy());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let result = ReportRequest::new(CompanyId(1), date(2023, 4, 1), date(2023, 3, 31), 12);
        assert!(matches!(
            result,
            Err(TrialBalanceError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_late_fiscal_year_start() {
        let mut request =
            ReportRequest::new(CompanyId(1), date(2023, 3, 1), date(2023, 3, 31), 12).unwrap();
        request.fy_start_date = date(2023, 4, 1);
        assert!(matches!(
            request.validate(),
            Err(TrialBalanceError::InvalidFiscalYearStart { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults_and_alias() {
        let json = r#"{
            "company_id": 7,
            "date_from": "2023-01-01",
            "date_to": "2023-12-31",
            "fy_start_date": "2023-01-01",
            "filter_account_ids": [3, 1],
            "hierarchy_on": "relation"
        }"#;

        let request: ReportRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.company_id, CompanyId(7));
        assert_eq!(request.hierarchy_on, HierarchyMode::Child);
        assert!(!request.only_posted_moves);
        assert!(request.has_account_filter());
        assert!(!request.uses_hierarchy());
        assert_eq!(
            request.filter_account_ids.iter().copied().collect::<Vec<_>>(),
            vec![AccountId(1), AccountId(3)]
        );
    }

    #[test]
    fn test_hierarchy_none_disables_groups() {
        let mut request =
            ReportRequest::new(CompanyId(1), date(2023, 1, 1), date(2023, 1, 31), 12).unwrap();
        request.hierarchy_on = HierarchyMode::None;
        assert!(!request.uses_hierarchy());

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""hierarchy_on":"none""#));
    }
}
