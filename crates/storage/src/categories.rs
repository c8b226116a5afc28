use chrono::Utc;
use ledgerly_core::{Category, CategorizeStats, KeywordClassifier, Transaction, UNCATEGORIZED};
use tracing::{error, info};

use crate::db::{DbPool, DATETIME_FORMAT};

pub async fn get_active_categories(pool: &DbPool) -> Result<Vec<Category>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, String, i64)>(
        "SELECT id, name, description, keywords, color, is_active FROM categories WHERE is_active = 1 ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, description, keywords, color, is_active)| Category {
            id: Some(id),
            name,
            description,
            keywords,
            color,
            is_active: is_active != 0,
        })
        .collect())
}

/// Snapshot the active categories for one consultation window. Callers
/// re-load when [`KeywordClassifier::is_stale`] says so.
pub async fn load_classifier(pool: &DbPool) -> Result<KeywordClassifier, sqlx::Error> {
    Ok(KeywordClassifier::new(get_active_categories(pool).await?))
}

/// Insert new categories and refresh existing ones by name. Returns
/// `(created, updated)` counts.
pub async fn upsert_categories(
    pool: &DbPool,
    categories: &[Category],
) -> Result<(usize, usize), sqlx::Error> {
    let mut created = 0;
    let mut updated = 0;
    for category in categories {
        let result = sqlx::query(
            "UPDATE categories SET description = ?, keywords = ?, color = ?, is_active = ? WHERE name = ?",
        )
        .bind(&category.description)
        .bind(&category.keywords)
        .bind(&category.color)
        .bind(category.is_active as i64)
        .bind(&category.name)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            updated += 1;
            continue;
        }

        sqlx::query(
            "INSERT INTO categories (name, description, keywords, color, is_active) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.keywords)
        .bind(&category.color)
        .bind(category.is_active as i64)
        .execute(pool)
        .await?;
        created += 1;
    }
    Ok((created, updated))
}

async fn find_or_create_uncategorized(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE name = ?")
        .bind(UNCATEGORIZED)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO categories (name, description, keywords, color) VALUES (?, ?, '', '#9CA3AF') RETURNING id",
    )
    .bind(UNCATEGORIZED)
    .bind("Transactions that couldn't be automatically categorized")
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Assign a category to each not-yet-categorized transaction in the batch.
///
/// Runs after an import has committed, as best-effort enrichment: a
/// failure here is logged and counted, never propagated into the import
/// result. Transactions with no keyword match land in the
/// "Uncategorized" catch-all so they are not re-scanned next time.
pub async fn categorize_batch(
    pool: &DbPool,
    transactions: &[Transaction],
) -> Result<CategorizeStats, sqlx::Error> {
    let mut stats = CategorizeStats {
        total: transactions.len(),
        ..CategorizeStats::default()
    };

    let pending: Vec<&Transaction> = transactions.iter().filter(|t| !t.is_categorized).collect();
    stats.skipped = stats.total - pending.len();
    if pending.is_empty() {
        return Ok(stats);
    }

    let classifier = load_classifier(pool).await?;
    let fallback_id = find_or_create_uncategorized(pool).await?;
    let now = Utc::now().naive_utc().format(DATETIME_FORMAT).to_string();

    let mut tx = pool.begin().await?;
    for txn in pending {
        let category_id = classifier.classify(&txn.search_text()).unwrap_or(fallback_id);
        let result = sqlx::query(
            "UPDATE transactions SET category_id = ?, is_categorized = 1, categorized_at = ? WHERE id = ?",
        )
        .bind(category_id)
        .bind(&now)
        .bind(txn.id)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => stats.categorized += 1,
            Err(e) => {
                stats.errors += 1;
                error!(transaction = txn.id, "failed to categorize: {e}");
            }
        }
    }
    tx.commit().await?;

    info!(
        total = stats.total,
        categorized = stats.categorized,
        skipped = stats.skipped,
        errors = stats.errors,
        "categorized imported transactions"
    );
    Ok(stats)
}
