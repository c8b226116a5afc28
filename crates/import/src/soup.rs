use ledgerly_core::{AccountDescriptor, StatementKind, StatementTransaction};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

use crate::dates::parse_ofx_datetime;
use crate::document::{RawDocument, Sections};
use crate::error::ImportError;
use crate::fields::extract_field;
use crate::pipeline::{ParsedStatement, VariantParser};

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_txn_open, r"(?i)<STMTTRN>");
// A transaction block also ends where the list closes or balance
// information begins; the last block of a list has no following
// <STMTTRN> to stop at.
re!(re_block_end, r"(?i)</BANKTRANLIST>|<LEDGERBAL>|<AVAILBAL>");

/// Tag-soup strategy: treat the document as flat SGML and pull
/// transaction blocks by position, ignoring nesting entirely.
///
/// Robust against malformed markup (unescaped `&`, stray `<` outside
/// tags) but blind to structure: it cannot tell two statement responses
/// apart and extracts account identity from the first occurrence of each
/// tag in the whole document.
pub struct TagSoupParser;

impl VariantParser for TagSoupParser {
    fn name(&self) -> &'static str {
        "tag-soup"
    }

    fn try_parse(&self, doc: &RawDocument) -> Result<ParsedStatement, ImportError> {
        let text = doc.text();
        let sections = Sections::detect(text);
        let kind = sections.kind().ok_or(ImportError::UnsupportedDocument)?;

        let bank_id = match kind {
            StatementKind::Bank => {
                Some(extract_field(text, "BANKID")).filter(|id| !id.is_empty())
            }
            StatementKind::CreditCard => None,
        };
        let currency = {
            let c = extract_field(text, "CURDEF");
            if c.is_empty() { "USD".to_string() } else { c }
        };
        let account = AccountDescriptor {
            kind,
            bank_id,
            account_id: extract_field(text, "ACCTID"),
            name: extract_field(text, "ORG"),
            currency: currency.clone(),
        };

        let mut transactions = Vec::new();
        for block in transaction_blocks(text) {
            match build_transaction(block, &currency) {
                Some(txn) => transactions.push(txn),
                None => debug!("dropping transaction block with missing or malformed fields"),
            }
        }
        if transactions.is_empty() {
            return Err(ImportError::NoTransactionsFound);
        }

        Ok(ParsedStatement { account, transactions })
    }
}

/// Spans between each `<STMTTRN>` marker and the next marker, the first
/// block terminator, or the end of input, whichever comes first.
fn transaction_blocks(text: &str) -> Vec<&str> {
    let opens: Vec<_> = re_txn_open().find_iter(text).collect();
    let mut blocks = Vec::with_capacity(opens.len());
    for (i, open) in opens.iter().enumerate() {
        let start = open.end();
        let hard_end = opens.get(i + 1).map(|next| next.start()).unwrap_or(text.len());
        let end = re_block_end()
            .find(&text[start..hard_end])
            .map(|m| start + m.start())
            .unwrap_or(hard_end);
        blocks.push(&text[start..end]);
    }
    blocks
}

/// The validity invariant lives here: FITID, posted date and amount must
/// all be present and parseable, otherwise the block is unusable. Field
/// failures invalidate one record, never the batch.
fn build_transaction(block: &str, currency: &str) -> Option<StatementTransaction> {
    let fitid = extract_field(block, "FITID");
    if fitid.is_empty() {
        return None;
    }
    let posted_at = parse_ofx_datetime(&extract_field(block, "DTPOSTED")).ok()?;
    let amount = Decimal::from_str(&extract_field(block, "TRNAMT")).ok()?;

    Some(StatementTransaction {
        fitid,
        posted_at,
        amount,
        trn_type: extract_field(block, "TRNTYPE"),
        name: extract_field(block, "NAME"),
        memo: extract_field(block, "MEMO"),
        check_number: extract_field(block, "CHECKNUM"),
        currency: currency.to_string(),
    })
}
