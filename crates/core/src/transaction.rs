use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// One transaction as extracted from a statement document.
///
/// Records only exist in this form once they have passed the extraction
/// invariant: a non-empty `fitid`, a parseable posted timestamp and a
/// parseable amount. Blocks missing any of the three are dropped by the
/// parsers and never reach persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTransaction {
    /// Financial Institution Transaction ID: the issuer's stable
    /// identifier, and the dedup key together with the account.
    pub fitid: String,
    pub posted_at: NaiveDateTime,
    /// Signed; negative is a debit/expense by OFX convention.
    pub amount: Decimal,
    pub trn_type: String,
    pub name: String,
    pub memo: String,
    pub check_number: String,
    pub currency: String,
}

/// A persisted transaction row. Field values are frozen at first import:
/// re-importing the same `(account, fitid)` never mutates an existing row,
/// only the categorization fields are updated after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: AccountId,
    pub fitid: String,
    pub posted_at: NaiveDateTime,
    pub amount: Decimal,
    pub trn_type: String,
    pub name: String,
    pub memo: String,
    pub check_number: String,
    pub currency: String,
    pub category_id: Option<i64>,
    pub is_categorized: bool,
    pub categorized_at: Option<NaiveDateTime>,
}

impl Transaction {
    /// Lowercased payee + memo text, the haystack keyword matching runs
    /// against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.memo).to_lowercase()
    }
}
