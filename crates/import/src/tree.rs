use ledgerly_core::{AccountDescriptor, StatementKind, StatementTransaction};
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::borrow::Cow;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

use crate::dates::parse_ofx_datetime;
use crate::document::RawDocument;
use crate::error::ImportError;
use crate::pipeline::{ParsedStatement, VariantParser};

/// Leaf value tags rewritten from the unclosed SGML form into closed XML
/// elements before tree parsing.
///
/// Kept as data, not logic: an OFX tag missing from this set stays
/// unclosed, the XML parse fails, and the orchestrator falls back to the
/// tag-soup strategy. An expected outcome, never a crash.
const LEAF_TAGS: &[&str] = &[
    "FITID", "DTPOSTED", "TRNAMT", "TRNTYPE", "NAME", "MEMO", "CODE", "SEVERITY", "TRNUID",
    "CURDEF", "BANKID", "ACCTID", "ACCTTYPE", "DTSTART", "DTEND", "BALAMT", "DTASOF", "DTSERVER",
    "LANGUAGE", "ORG", "FID", "CHECKNUM",
];

fn re_leaf_tag() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        let tags = LEAF_TAGS.join("|");
        Regex::new(&format!(r"(?i)<({tags})>([^<\r\n]*)(</({tags})>)?"))
            .expect("invalid leaf tag pattern")
    })
}

/// Close every known leaf value tag. Occurrences that are already closed
/// pass through untouched, so the rewrite is safe on mixed documents.
fn promote_leaf_tags(body: &str) -> String {
    re_leaf_tag()
        .replace_all(body, |caps: &Captures| {
            let tag = &caps[1];
            let value = caps[2].trim();
            match caps.get(4) {
                Some(close) if close.as_str().eq_ignore_ascii_case(tag) => caps[0].to_string(),
                _ => {
                    // A close tag for a different leaf (pathological but
                    // possible) is kept after the promoted element.
                    let trailing = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                    format!("<{tag}>{value}</{tag}>{trailing}")
                }
            }
        })
        .into_owned()
}

// ── Typed element paths ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OfxDocument {
    #[serde(rename = "SIGNONMSGSRSV1", default)]
    signon: Option<SignonSection>,
    #[serde(rename = "BANKMSGSRSV1", default)]
    bank: Option<BankSection>,
    #[serde(rename = "CREDITCARDMSGSRSV1", default)]
    credit_card: Option<CreditCardSection>,
}

#[derive(Debug, Deserialize)]
struct SignonSection {
    #[serde(rename = "SONRS", default)]
    response: Option<SignonResponse>,
}

#[derive(Debug, Deserialize)]
struct SignonResponse {
    #[serde(rename = "FI", default)]
    institution: Option<FinancialInstitution>,
}

#[derive(Debug, Deserialize)]
struct FinancialInstitution {
    #[serde(rename = "ORG", default)]
    org: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BankSection {
    // One message section may carry several statement responses; the
    // regex strategy cannot tell them apart, this one can.
    #[serde(rename = "STMTTRNRS", default)]
    responses: Vec<BankStatementResponse>,
}

#[derive(Debug, Deserialize)]
struct BankStatementResponse {
    #[serde(rename = "STMTRS", default)]
    statement: Option<BankStatement>,
}

#[derive(Debug, Deserialize)]
struct BankStatement {
    #[serde(rename = "CURDEF", default)]
    currency: Option<String>,
    #[serde(rename = "BANKACCTFROM", default)]
    account: Option<BankAccountFrom>,
    #[serde(rename = "BANKTRANLIST", default)]
    transactions: Option<TransactionList>,
}

#[derive(Debug, Deserialize)]
struct BankAccountFrom {
    #[serde(rename = "BANKID", default)]
    bank_id: Option<String>,
    #[serde(rename = "ACCTID", default)]
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditCardSection {
    #[serde(rename = "CCSTMTTRNRS", default)]
    responses: Vec<CreditCardStatementResponse>,
}

#[derive(Debug, Deserialize)]
struct CreditCardStatementResponse {
    #[serde(rename = "CCSTMTRS", default)]
    statement: Option<CreditCardStatement>,
}

#[derive(Debug, Deserialize)]
struct CreditCardStatement {
    #[serde(rename = "CURDEF", default)]
    currency: Option<String>,
    #[serde(rename = "CCACCTFROM", default)]
    account: Option<CreditCardAccountFrom>,
    #[serde(rename = "BANKTRANLIST", default)]
    transactions: Option<TransactionList>,
}

#[derive(Debug, Deserialize)]
struct CreditCardAccountFrom {
    #[serde(rename = "ACCTID", default)]
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionList {
    #[serde(rename = "STMTTRN", default)]
    entries: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(rename = "TRNTYPE", default)]
    trn_type: Option<String>,
    #[serde(rename = "DTPOSTED", default)]
    posted: Option<String>,
    #[serde(rename = "TRNAMT", default)]
    amount: Option<String>,
    #[serde(rename = "FITID", default)]
    fitid: Option<String>,
    #[serde(rename = "NAME", default)]
    name: Option<String>,
    #[serde(rename = "MEMO", default)]
    memo: Option<String>,
    #[serde(rename = "CHECKNUM", default)]
    check_number: Option<String>,
}

impl RawTransaction {
    /// Same validity invariant as the tag-soup strategy: FITID, posted
    /// date and amount must all parse or the record is dropped.
    fn to_statement(&self, currency: &str) -> Option<StatementTransaction> {
        let fitid = self.fitid.as_deref().unwrap_or("").trim();
        if fitid.is_empty() {
            return None;
        }
        let posted_at = parse_ofx_datetime(self.posted.as_deref()?).ok()?;
        let amount = Decimal::from_str(self.amount.as_deref()?.trim()).ok()?;

        let text = |field: &Option<String>| field.as_deref().unwrap_or("").trim().to_string();
        Some(StatementTransaction {
            fitid: fitid.to_string(),
            posted_at,
            amount,
            trn_type: text(&self.trn_type),
            name: text(&self.name),
            memo: text(&self.memo),
            check_number: text(&self.check_number),
            currency: currency.to_string(),
        })
    }
}

/// Structural strategy: promote SGML leaf tags to well-formed XML, then
/// walk the statement element paths with a tree parser.
///
/// Handles nesting the regex strategy cannot see (multiple statement
/// responses per section) but fails outright on genuinely malformed XML
/// characters; an unescaped `&` in a memo is enough. That brittleness is
/// why the fallback chain exists.
pub struct StructuralParser;

impl VariantParser for StructuralParser {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn try_parse(&self, doc: &RawDocument) -> Result<ParsedStatement, ImportError> {
        let text = doc.text();
        let start = text
            .find("<OFX>")
            .ok_or_else(|| ImportError::Xml("missing <OFX> root element".to_string()))?;
        let end = text[start..]
            .find("</OFX>")
            .ok_or_else(|| ImportError::Xml("missing </OFX> close tag".to_string()))?;
        let body = &text[start..start + end + "</OFX>".len()];

        let body: Cow<'_, str> = if text.trim_start().starts_with("<?xml") {
            Cow::Borrowed(body)
        } else {
            Cow::Owned(promote_leaf_tags(body))
        };

        let parsed: OfxDocument =
            serde_xml_rs::from_str(&body).map_err(|e| ImportError::Xml(e.to_string()))?;

        let org = parsed
            .signon
            .and_then(|s| s.response)
            .and_then(|r| r.institution)
            .and_then(|fi| fi.org)
            .unwrap_or_default();

        let mut descriptor: Option<AccountDescriptor> = None;
        let mut transactions = Vec::new();

        if let Some(section) = &parsed.bank {
            for response in &section.responses {
                let Some(stmt) = &response.statement else { continue };
                let currency = currency_or_default(&stmt.currency);
                if descriptor.is_none() {
                    descriptor = Some(AccountDescriptor {
                        kind: StatementKind::Bank,
                        bank_id: stmt
                            .account
                            .as_ref()
                            .and_then(|a| a.bank_id.clone())
                            .map(|id| id.trim().to_string())
                            .filter(|id| !id.is_empty()),
                        account_id: account_id_of(stmt.account.as_ref().and_then(|a| a.account_id.as_deref())),
                        name: org.clone(),
                        currency: currency.clone(),
                    });
                }
                collect_transactions(stmt.transactions.as_ref(), &currency, &mut transactions);
            }
        }

        if let Some(section) = &parsed.credit_card {
            for response in &section.responses {
                let Some(stmt) = &response.statement else { continue };
                let currency = currency_or_default(&stmt.currency);
                if descriptor.is_none() {
                    descriptor = Some(AccountDescriptor {
                        kind: StatementKind::CreditCard,
                        bank_id: None,
                        account_id: account_id_of(stmt.account.as_ref().and_then(|a| a.account_id.as_deref())),
                        name: org.clone(),
                        currency: currency.clone(),
                    });
                }
                collect_transactions(stmt.transactions.as_ref(), &currency, &mut transactions);
            }
        }

        let account = descriptor.ok_or(ImportError::UnsupportedDocument)?;
        if transactions.is_empty() {
            return Err(ImportError::NoTransactionsFound);
        }
        Ok(ParsedStatement { account, transactions })
    }
}

fn currency_or_default(currency: &Option<String>) -> String {
    currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("USD")
        .to_string()
}

fn account_id_of(raw: Option<&str>) -> String {
    raw.unwrap_or("").trim().to_string()
}

fn collect_transactions(
    list: Option<&TransactionList>,
    currency: &str,
    out: &mut Vec<StatementTransaction>,
) {
    let Some(list) = list else { return };
    for raw in &list.entries {
        match raw.to_statement(currency) {
            Some(txn) => out.push(txn),
            None => debug!("dropping transaction element with missing or malformed fields"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<?OFX OFXHEADER="200" VERSION="220" SECURITY="NONE"?>
<OFX>
    <SIGNONMSGSRSV1>
        <SONRS>
            <FI><ORG>FIRST NATIONAL</ORG><FID>1001</FID></FI>
        </SONRS>
    </SIGNONMSGSRSV1>
    <BANKMSGSRSV1>
        <STMTTRNRS>
            <STMTRS>
                <CURDEF>USD</CURDEF>
                <BANKACCTFROM>
                    <BANKID>99999999</BANKID>
                    <ACCTID>123456789</ACCTID>
                    <ACCTTYPE>CHECKING</ACCTTYPE>
                </BANKACCTFROM>
                <BANKTRANLIST>
                    <DTSTART>20241201</DTSTART>
                    <DTEND>20241231</DTEND>
                    <STMTTRN>
                        <TRNTYPE>DEBIT</TRNTYPE>
                        <DTPOSTED>20241205120000</DTPOSTED>
                        <TRNAMT>-12.34</TRNAMT>
                        <FITID>ABC123</FITID>
                        <NAME>Coffee Shop</NAME>
                        <MEMO>Morning espresso</MEMO>
                    </STMTTRN>
                    <STMTTRN>
                        <TRNTYPE>CREDIT</TRNTYPE>
                        <DTPOSTED>20241215</DTPOSTED>
                        <TRNAMT>1500.00</TRNAMT>
                        <FITID>ABC124</FITID>
                        <NAME>DIRECT DEPOSIT</NAME>
                    </STMTTRN>
                </BANKTRANLIST>
            </STMTRS>
        </STMTTRNRS>
    </BANKMSGSRSV1>
</OFX>"#;

    const SAMPLE_SGML: &str = r#"OFXHEADER:100
DATA:OFXSGML
VERSION:102

<OFX>
<SIGNONMSGSRSV1>
<SONRS>
<STATUS>
<CODE>0
<SEVERITY>INFO
</STATUS>
<FI>
<ORG>FIRST NATIONAL
</FI>
</SONRS>
</SIGNONMSGSRSV1>
<BANKMSGSRSV1>
<STMTTRNRS>
<TRNUID>1
<STMTRS>
<CURDEF>USD
<BANKACCTFROM>
<BANKID>99999999
<ACCTID>123456789
</BANKACCTFROM>
<BANKTRANLIST>
<DTSTART>20241201
<DTEND>20241231
<STMTTRN>
<TRNTYPE>DEBIT
<DTPOSTED>20241205120000
<TRNAMT>-12.34
<FITID>ABC123
<NAME>Coffee Shop
</STMTTRN>
</BANKTRANLIST>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>
"#;

    #[test]
    fn parses_xml_statement() {
        let parsed = StructuralParser
            .try_parse(&RawDocument::from_text(SAMPLE_XML))
            .unwrap();
        assert_eq!(parsed.account.kind, StatementKind::Bank);
        assert_eq!(parsed.account.bank_id.as_deref(), Some("99999999"));
        assert_eq!(parsed.account.account_id, "123456789");
        assert_eq!(parsed.account.name, "FIRST NATIONAL");
        assert_eq!(parsed.transactions.len(), 2);

        let t0 = &parsed.transactions[0];
        assert_eq!(t0.fitid, "ABC123");
        assert_eq!(t0.amount.to_string(), "-12.34");
        assert_eq!(
            t0.posted_at,
            NaiveDate::from_ymd_opt(2024, 12, 5)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(t0.memo, "Morning espresso");
        assert_eq!(parsed.transactions[1].memo, "");
    }

    #[test]
    fn parses_sgml_statement_after_promotion() {
        let parsed = StructuralParser
            .try_parse(&RawDocument::from_text(SAMPLE_SGML))
            .unwrap();
        assert_eq!(parsed.account.account_id, "123456789");
        assert_eq!(parsed.account.name, "FIRST NATIONAL");
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.transactions[0].name, "Coffee Shop");
    }

    #[test]
    fn multiple_statement_responses_are_all_collected() {
        let text = r#"<OFX>
<BANKMSGSRSV1>
<STMTTRNRS>
<STMTRS>
<CURDEF>USD
<BANKACCTFROM>
<BANKID>1
<ACCTID>CHECKING-1
</BANKACCTFROM>
<BANKTRANLIST>
<STMTTRN>
<DTPOSTED>20240101
<TRNAMT>-1.00
<FITID>A1
</STMTTRN>
</BANKTRANLIST>
</STMTRS>
</STMTTRNRS>
<STMTTRNRS>
<STMTRS>
<CURDEF>USD
<BANKACCTFROM>
<BANKID>1
<ACCTID>SAVINGS-2
</BANKACCTFROM>
<BANKTRANLIST>
<STMTTRN>
<DTPOSTED>20240102
<TRNAMT>-2.00
<FITID>B1
</STMTTRN>
</BANKTRANLIST>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>"#;
        let parsed = StructuralParser
            .try_parse(&RawDocument::from_text(text))
            .unwrap();
        // Account identity comes from the first response; transactions
        // from every response.
        assert_eq!(parsed.account.account_id, "CHECKING-1");
        assert_eq!(parsed.transactions.len(), 2);
    }

    #[test]
    fn credit_card_statement() {
        let text = r#"<OFX>
<CREDITCARDMSGSRSV1>
<CCSTMTTRNRS>
<CCSTMTRS>
<CURDEF>EUR
<CCACCTFROM>
<ACCTID>4111111111111111
</CCACCTFROM>
<BANKTRANLIST>
<STMTTRN>
<DTPOSTED>20240301
<TRNAMT>-20.00
<FITID>CC1
<NAME>AIRLINE
</STMTTRN>
</BANKTRANLIST>
</CCSTMTRS>
</CCSTMTTRNRS>
</CREDITCARDMSGSRSV1>
</OFX>"#;
        let parsed = StructuralParser
            .try_parse(&RawDocument::from_text(text))
            .unwrap();
        assert_eq!(parsed.account.kind, StatementKind::CreditCard);
        assert_eq!(parsed.account.bank_id, None);
        assert_eq!(parsed.account.currency, "EUR");
        assert_eq!(parsed.transactions.len(), 1);
    }

    #[test]
    fn unescaped_ampersand_fails_the_xml_parse() {
        let text = SAMPLE_SGML.replace("<NAME>Coffee Shop", "<NAME>Coffee & Donuts");
        let err = StructuralParser
            .try_parse(&RawDocument::from_text(text.as_str()))
            .unwrap_err();
        assert!(matches!(err, ImportError::Xml(_)));
    }

    #[test]
    fn missing_root_element_is_an_xml_error() {
        let err = StructuralParser
            .try_parse(&RawDocument::from_text("just some text"))
            .unwrap_err();
        assert!(matches!(err, ImportError::Xml(_)));
    }

    #[test]
    fn invalid_amount_drops_only_that_record() {
        let text = SAMPLE_XML.replace("<TRNAMT>-12.34</TRNAMT>", "<TRNAMT>abc</TRNAMT>");
        let parsed = StructuralParser
            .try_parse(&RawDocument::from_text(text.as_str()))
            .unwrap();
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.transactions[0].fitid, "ABC124");
    }

    #[test]
    fn statement_without_transactions_is_an_error() {
        let text = r#"<OFX>
<BANKMSGSRSV1>
<STMTTRNRS>
<STMTRS>
<CURDEF>USD
<BANKACCTFROM>
<BANKID>1
<ACCTID>2
</BANKACCTFROM>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>"#;
        assert!(matches!(
            StructuralParser.try_parse(&RawDocument::from_text(text)),
            Err(ImportError::NoTransactionsFound)
        ));
    }

    // ── promotion ─────────────────────────────────────────────────────────────

    #[test]
    fn promotion_closes_unclosed_leaf_tags() {
        let out = promote_leaf_tags("<FITID>TXN001\n<TRNAMT>-5.00\n");
        assert!(out.contains("<FITID>TXN001</FITID>"));
        assert!(out.contains("<TRNAMT>-5.00</TRNAMT>"));
    }

    #[test]
    fn promotion_preserves_already_closed_tags() {
        let out = promote_leaf_tags("<FITID>TXN001</FITID>");
        assert_eq!(out.matches("</FITID>").count(), 1);
    }

    #[test]
    fn promotion_keeps_original_tag_case() {
        assert_eq!(promote_leaf_tags("<fitid>x\n"), "<fitid>x</fitid>\n");
    }

    #[test]
    fn promotion_closes_empty_values() {
        assert_eq!(promote_leaf_tags("<MEMO>\n"), "<MEMO></MEMO>\n");
    }

    #[test]
    fn promotion_leaves_unknown_tags_alone() {
        let out = promote_leaf_tags("<INTU.BID>5500\n<FITID>1\n");
        assert!(out.contains("<INTU.BID>5500\n"));
        assert!(out.contains("<FITID>1</FITID>"));
    }

    #[test]
    fn promotion_trims_trailing_value_whitespace() {
        assert_eq!(promote_leaf_tags("<NAME>Coffee \n"), "<NAME>Coffee</NAME>\n");
    }
}
