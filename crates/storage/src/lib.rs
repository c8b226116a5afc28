pub mod categories;
pub mod db;
pub mod ledger;

pub use categories::{
    categorize_batch, get_active_categories, load_classifier, upsert_categories,
};
pub use db::{create_db, seed_default_categories, DbPool};
pub use ledger::{get_accounts, get_recent_transactions, reconcile, ImportOutcome};
