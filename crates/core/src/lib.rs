pub mod account;
pub mod category;
pub mod transaction;

pub use account::{Account, AccountDescriptor, AccountId, StatementKind};
pub use category::{
    categories_from_toml, Category, CategorizeStats, KeywordClassifier, DEFAULT_CATEGORIES,
    UNCATEGORIZED,
};
pub use transaction::{StatementTransaction, Transaction};
