use thiserror::Error;

/// Failure taxonomy for statement imports.
///
/// Field-level problems never surface here; a block with a bad amount or
/// date is dropped where it is found. These variants are document- and
/// strategy-level: they describe why a whole parse attempt produced
/// nothing usable.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The file is an outbound statement request echo (`STMTTRNRQ` with no
    /// response section) and carries no transactions. Re-trying with the
    /// same file can never succeed.
    #[error("document is a statement request (STMTTRNRQ) with no response data; export a statement file instead")]
    RequestOnly,

    /// Neither a bank nor a credit-card statement section is present.
    #[error("no bank or credit-card statement section found")]
    UnsupportedDocument,

    /// A date token could not be parsed in a context that requires one.
    #[error("invalid OFX date: '{0}'")]
    MalformedDate(String),

    /// The parse completed structurally but yielded zero valid records.
    /// An empty import almost always means the format was not actually
    /// recognized, so it is an error rather than a zero-count success.
    #[error("no valid transactions found in statement")]
    NoTransactionsFound,

    /// The document could not be read as XML, even after leaf-tag
    /// promotion. Expected for tag-soup files with unescaped markup
    /// characters; the orchestrator falls back to the regex strategy.
    #[error("statement XML error: {0}")]
    Xml(String),

    /// Both strategies failed. Both messages are kept: the two parsers
    /// fail for different reasons, and operators need to see each to tell
    /// "not OFX at all" from "OFX neither strategy handles".
    #[error("all parse strategies failed; structural: {primary}; tag-soup: {fallback}")]
    AllStrategiesFailed {
        primary: Box<ImportError>,
        fallback: Box<ImportError>,
    },
}
