use ledgerly_core::{AccountDescriptor, StatementTransaction};
use tracing::debug;

use crate::document::{classify, RawDocument};
use crate::error::ImportError;
use crate::soup::TagSoupParser;
use crate::tree::StructuralParser;

/// The common output shape of both parse strategies.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub account: AccountDescriptor,
    pub transactions: Vec<StatementTransaction>,
}

/// One parse strategy. Both implementations accept the same document and
/// produce the same record shape; they differ only in how they read it.
pub trait VariantParser {
    fn name(&self) -> &'static str;
    fn try_parse(&self, doc: &RawDocument) -> Result<ParsedStatement, ImportError>;
}

/// Parse one statement document, trying the structural strategy first and
/// the tag-soup strategy second.
///
/// The two fail for disjoint reasons (the structural parser chokes on
/// malformed XML characters, the regex parser on unusual nesting), so the
/// chain imports strictly more real-world files than either alone, at the
/// cost of double work when both fail.
///
/// Classification runs once up front: a request-only or sectionless
/// document can never parse, so those errors propagate directly instead
/// of being reported twice.
pub fn parse_statement(doc: &RawDocument) -> Result<ParsedStatement, ImportError> {
    classify(doc)?;

    let primary = StructuralParser;
    let primary_err = match primary.try_parse(doc) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };
    debug!(strategy = primary.name(), error = %primary_err, "parse strategy failed, falling back");

    let fallback = TagSoupParser;
    match fallback.try_parse(doc) {
        Ok(parsed) => Ok(parsed),
        Err(fallback_err) => Err(ImportError::AllStrategiesFailed {
            primary: Box::new(primary_err),
            fallback: Box::new(fallback_err),
        }),
    }
}
