use anyhow::Context;
use ledgerly_import::RawDocument;
use ledgerly_storage::DbPool;
use std::path::Path;
use tracing::{info, warn};

pub async fn import(pool: &DbPool, owner: &str, file: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let doc = RawDocument::from_bytes(&bytes);

    let parsed = ledgerly_import::parse_statement(&doc)
        .with_context(|| format!("parsing {}", file.display()))?;

    let outcome = ledgerly_storage::reconcile(pool, owner, &parsed.account, &parsed.transactions)
        .await
        .context("writing transactions to the ledger")?;
    info!(
        account = %outcome.account,
        parsed = parsed.transactions.len(),
        created = outcome.created_count(),
        "statement imported"
    );

    // Runs after the import has committed; a categorization failure must
    // never undo a successful import.
    if !outcome.created.is_empty() {
        match ledgerly_storage::categorize_batch(pool, &outcome.created).await {
            Ok(stats) => println!(
                "Categorized {} of {} new transactions.",
                stats.categorized, stats.total
            ),
            Err(e) => warn!("categorization failed: {e}"),
        }
    }

    println!(
        "Imported {} new transactions into {}.",
        outcome.created_count(),
        outcome.account
    );
    Ok(())
}

pub async fn list_accounts(pool: &DbPool, owner: &str) -> anyhow::Result<()> {
    let accounts = ledgerly_storage::get_accounts(pool, owner).await?;
    if accounts.is_empty() {
        println!("No accounts yet. Run `ledgerly import <file.ofx>` first.");
        return Ok(());
    }
    for account in accounts {
        println!("{:>4}  {}  [{}]", account.id, account, account.currency);
    }
    Ok(())
}

pub async fn list_transactions(pool: &DbPool, owner: &str, limit: i64) -> anyhow::Result<()> {
    let transactions = ledgerly_storage::get_recent_transactions(pool, owner, limit).await?;
    if transactions.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }
    for txn in transactions {
        let label = if txn.name.is_empty() { &txn.memo } else { &txn.name };
        println!(
            "{}  {:>12}  {}",
            txn.posted_at.format("%Y-%m-%d"),
            txn.amount,
            label
        );
    }
    Ok(())
}

pub async fn seed_categories(pool: &DbPool) -> anyhow::Result<()> {
    ledgerly_storage::seed_default_categories(pool).await?;
    let count = ledgerly_storage::get_active_categories(pool).await?.len();
    println!("Seeded default categories ({count} active).");
    Ok(())
}

pub async fn list_categories(pool: &DbPool) -> anyhow::Result<()> {
    let categories = ledgerly_storage::get_active_categories(pool).await?;
    if categories.is_empty() {
        println!("No categories. Run `ledgerly categories seed` first.");
        return Ok(());
    }
    for category in categories {
        println!("{}  |  {}", category.name, category.keywords);
    }
    Ok(())
}

pub async fn load_categories(pool: &DbPool, file: &Path) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let categories = ledgerly_core::categories_from_toml(&content)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("parsing {}", file.display()))?;
    let (created, updated) = ledgerly_storage::upsert_categories(pool, &categories).await?;
    println!("Loaded categories: {created} created, {updated} updated.");
    Ok(())
}
