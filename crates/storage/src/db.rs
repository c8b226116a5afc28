use ledgerly_core::DEFAULT_CATEGORIES;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

/// Storage form for timestamps; parsed back with the same format.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    // bank_id stores '' rather than NULL for credit-card accounts so the
    // unique constraint participates (NULLs are pairwise distinct in
    // SQLite unique indexes).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            kind TEXT NOT NULL,
            bank_id TEXT NOT NULL DEFAULT '',
            account_id TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            currency TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (owner, kind, bank_id, account_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            keywords TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            fitid TEXT NOT NULL,
            posted_at TEXT NOT NULL,
            amount TEXT NOT NULL,
            trn_type TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            memo TEXT NOT NULL DEFAULT '',
            check_number TEXT NOT NULL DEFAULT '',
            currency TEXT NOT NULL DEFAULT '',
            category_id INTEGER,
            is_categorized INTEGER NOT NULL DEFAULT 0,
            categorized_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (account_id, fitid),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_posted ON transactions(account_id, posted_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (name, description, keywords, color) in DEFAULT_CATEGORIES {
        sqlx::query(
            "INSERT OR IGNORE INTO categories (name, description, keywords, color, is_active) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(name)
        .bind(description)
        .bind(keywords)
        .bind(color)
        .execute(pool)
        .await?;
    }

    Ok(())
}
