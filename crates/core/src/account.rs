use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two statement flavors a document can carry. Anything else
/// (investment, loan) is out of scope and rejected upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Bank,
    CreditCard,
}

impl StatementKind {
    /// Canonical storage form, shared with the DB schema.
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Bank => "BANK",
            StatementKind::CreditCard => "CREDITCARD",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Bank => write!(f, "Bank"),
            StatementKind::CreditCard => write!(f, "Credit Card"),
        }
    }
}

impl std::str::FromStr for StatementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BANK" => Ok(StatementKind::Bank),
            "CREDITCARD" => Ok(StatementKind::CreditCard),
            other => Err(format!("Unknown statement kind: '{other}'")),
        }
    }
}

/// Account identity as extracted from a statement document. The parsers
/// produce one of these per parse; persistence assigns the row id.
///
/// `bank_id` is only present for bank statements; credit-card statements
/// identify the account by `account_id` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    pub kind: StatementKind,
    pub bank_id: Option<String>,
    pub account_id: String,
    /// Issuing organization name, used as the default display name.
    pub name: String,
    pub currency: String,
}

/// A persisted account row. Uniqueness is `(owner, kind, bank_id,
/// account_id)`; the display name is whatever the first import saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub kind: StatementKind,
    pub bank_id: Option<String>,
    pub account_id: String,
    pub name: String,
    pub currency: String,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{} - {}", self.kind, self.account_id)
        } else {
            write!(f, "{} - {} - {}", self.kind, self.name, self.account_id)
        }
    }
}
