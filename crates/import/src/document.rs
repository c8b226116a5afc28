use ledgerly_core::StatementKind;

use crate::error::ImportError;

/// Header and status tags always appear early; only this much of the
/// document is inspected for the request-vs-response decision.
const SNIFF_WINDOW: usize = 4096;

/// One statement document, decoded once at the ingestion boundary.
#[derive(Debug, Clone)]
pub struct RawDocument {
    text: String,
}

impl RawDocument {
    /// Decode a byte buffer. Strict UTF-8 first; on invalid UTF-8 the
    /// buffer is read as Latin-1, the common encoding of older OFX 1.x
    /// exports (every byte maps to the code point of the same value, so
    /// this never fails).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        };
        RawDocument { text }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        RawDocument { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Which statement sections a document carries. A single file may hold
/// both a bank and a credit-card response; both are parsed when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub bank: bool,
    pub credit_card: bool,
}

impl Sections {
    /// Case-insensitive substring search over the whole document.
    pub fn detect(text: &str) -> Sections {
        let upper = text.to_uppercase();
        Sections {
            bank: upper.contains("<BANKMSGSRSV1>"),
            credit_card: upper.contains("<CREDITCARDMSGSRSV1>"),
        }
    }

    pub fn any(&self) -> bool {
        self.bank || self.credit_card
    }

    /// The kind the account descriptor is taken from. The bank section
    /// wins when both are present.
    pub fn kind(&self) -> Option<StatementKind> {
        if self.bank {
            Some(StatementKind::Bank)
        } else if self.credit_card {
            Some(StatementKind::CreditCard)
        } else {
            None
        }
    }
}

/// Decide whether a document is worth handing to a parser at all.
///
/// Rejects request-only files (`STMTTRNRQ` present in the sniff window
/// with no `STMTTRNRS`/`STMTRS` response marker) and files with no
/// recognizable statement section.
pub fn classify(doc: &RawDocument) -> Result<Sections, ImportError> {
    let text = doc.text();

    let mut end = text.len().min(SNIFF_WINDOW);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let head = text[..end].to_uppercase();
    if head.contains("STMTTRNRQ") && !head.contains("STMTTRNRS") && !head.contains("STMTRS") {
        return Err(ImportError::RequestOnly);
    }

    let sections = Sections::detect(text);
    if !sections.any() {
        return Err(ImportError::UnsupportedDocument);
    }
    Ok(sections)
}
