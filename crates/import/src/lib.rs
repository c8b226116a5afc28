pub mod dates;
pub mod document;
pub mod error;
pub mod fields;
pub mod pipeline;
pub mod soup;
pub mod tree;

pub use dates::parse_ofx_datetime;
pub use document::{classify, RawDocument, Sections};
pub use error::ImportError;
pub use fields::extract_field;
pub use pipeline::{parse_statement, ParsedStatement, VariantParser};
pub use soup::TagSoupParser;
pub use tree::StructuralParser;
