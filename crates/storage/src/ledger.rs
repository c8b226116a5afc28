use chrono::NaiveDateTime;
use ledgerly_core::{
    Account, AccountDescriptor, AccountId, StatementKind, StatementTransaction, Transaction,
};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::db::{DbPool, DATETIME_FORMAT};

/// Result of reconciling one parsed statement: the account it landed in
/// and the rows that did not exist before this import.
#[derive(Debug)]
pub struct ImportOutcome {
    pub account: Account,
    pub created: Vec<Transaction>,
}

impl ImportOutcome {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }
}

/// Merge a parsed statement into the ledger as one atomic unit.
///
/// The account is found or created by `(owner, kind, bank_id, account_id)`
/// and each transaction by `(account, fitid)`. Existing rows are never
/// touched: re-importing a statement (or an amended copy reusing the same
/// FITIDs) creates nothing and mutates nothing. A storage error rolls the
/// whole import back; the caller sees either every new row or none.
pub async fn reconcile(
    pool: &DbPool,
    owner: &str,
    descriptor: &AccountDescriptor,
    transactions: &[StatementTransaction],
) -> Result<ImportOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let account = find_or_create_account(&mut tx, owner, descriptor).await?;

    let mut created = Vec::with_capacity(transactions.len());
    for txn in transactions {
        if let Some(row) = insert_transaction_if_new(&mut tx, account.id, txn).await? {
            created.push(row);
        }
    }

    tx.commit().await?;

    Ok(ImportOutcome { account, created })
}

async fn find_or_create_account(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    owner: &str,
    descriptor: &AccountDescriptor,
) -> Result<Account, sqlx::Error> {
    let bank_id = descriptor.bank_id.as_deref().unwrap_or("");

    let existing = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, currency FROM accounts WHERE owner = ? AND kind = ? AND bank_id = ? AND account_id = ?",
    )
    .bind(owner)
    .bind(descriptor.kind.as_str())
    .bind(bank_id)
    .bind(&descriptor.account_id)
    .fetch_optional(&mut **tx)
    .await?;

    // First write wins: an existing account keeps its stored name and
    // currency no matter what later imports claim.
    if let Some((id, name, currency)) = existing {
        return Ok(Account {
            id: AccountId(id),
            owner: owner.to_string(),
            kind: descriptor.kind,
            bank_id: descriptor.bank_id.clone(),
            account_id: descriptor.account_id.clone(),
            name,
            currency,
        });
    }

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO accounts (owner, kind, bank_id, account_id, name, currency) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(owner)
    .bind(descriptor.kind.as_str())
    .bind(bank_id)
    .bind(&descriptor.account_id)
    .bind(&descriptor.name)
    .bind(&descriptor.currency)
    .fetch_one(&mut **tx)
    .await?;

    Ok(Account {
        id: AccountId(id),
        owner: owner.to_string(),
        kind: descriptor.kind,
        bank_id: descriptor.bank_id.clone(),
        account_id: descriptor.account_id.clone(),
        name: descriptor.name.clone(),
        currency: descriptor.currency.clone(),
    })
}

/// `ON CONFLICT DO NOTHING` keyed on `(account_id, fitid)`: the unique
/// constraint makes duplicate imports, concurrent ones included, land
/// as "already exists" instead of a second row.
async fn insert_transaction_if_new(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    account_id: AccountId,
    txn: &StatementTransaction,
) -> Result<Option<Transaction>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO transactions
            (account_id, fitid, posted_at, amount, trn_type, name, memo, check_number, currency)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (account_id, fitid) DO NOTHING
        "#,
    )
    .bind(account_id.0)
    .bind(&txn.fitid)
    .bind(txn.posted_at.format(DATETIME_FORMAT).to_string())
    .bind(txn.amount.to_string())
    .bind(&txn.trn_type)
    .bind(&txn.name)
    .bind(&txn.memo)
    .bind(&txn.check_number)
    .bind(&txn.currency)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(Transaction {
        id: result.last_insert_rowid(),
        account_id,
        fitid: txn.fitid.clone(),
        posted_at: txn.posted_at,
        amount: txn.amount,
        trn_type: txn.trn_type.clone(),
        name: txn.name.clone(),
        memo: txn.memo.clone(),
        check_number: txn.check_number.clone(),
        currency: txn.currency.clone(),
        category_id: None,
        is_categorized: false,
        categorized_at: None,
    }))
}

pub async fn get_accounts(pool: &DbPool, owner: &str) -> Result<Vec<Account>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, String, String, String)>(
        "SELECT id, owner, kind, bank_id, account_id, name, currency FROM accounts WHERE owner = ? ORDER BY name, account_id",
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, owner, kind, bank_id, account_id, name, currency)| Account {
            id: AccountId(id),
            owner,
            kind: StatementKind::from_str(&kind).unwrap_or(StatementKind::Bank),
            bank_id: Some(bank_id).filter(|b| !b.is_empty()),
            account_id,
            name,
            currency,
        })
        .collect())
}

type TransactionRow = (
    i64,
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<i64>,
    i64,
    Option<String>,
);

pub async fn get_recent_transactions(
    pool: &DbPool,
    owner: &str,
    limit: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT t.id, t.account_id, t.fitid, t.posted_at, t.amount, t.trn_type, t.name, t.memo,
               t.check_number, t.currency, t.category_id, t.is_categorized, t.categorized_at
        FROM transactions t
        JOIN accounts a ON a.id = t.account_id
        WHERE a.owner = ?
        ORDER BY t.posted_at DESC, t.id DESC
        LIMIT ?
        "#,
    )
    .bind(owner)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_transaction).collect()
}

fn row_to_transaction(row: TransactionRow) -> Result<Transaction, sqlx::Error> {
    let (
        id,
        account_id,
        fitid,
        posted_at,
        amount,
        trn_type,
        name,
        memo,
        check_number,
        currency,
        category_id,
        is_categorized,
        categorized_at,
    ) = row;

    let posted_at = parse_stored_datetime(&posted_at)?;
    let amount = Decimal::from_str(&amount)
        .map_err(|e| sqlx::Error::Decode(format!("invalid stored amount '{amount}': {e}").into()))?;
    let categorized_at = categorized_at
        .as_deref()
        .map(parse_stored_datetime)
        .transpose()?;

    Ok(Transaction {
        id,
        account_id: AccountId(account_id),
        fitid,
        posted_at,
        amount,
        trn_type,
        name,
        memo,
        check_number,
        currency,
        category_id,
        is_categorized: is_categorized != 0,
        categorized_at,
    })
}

fn parse_stored_datetime(raw: &str) -> Result<NaiveDateTime, sqlx::Error> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map_err(|e| sqlx::Error::Decode(format!("invalid stored timestamp '{raw}': {e}").into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use chrono::NaiveDate;

    fn descriptor() -> AccountDescriptor {
        AccountDescriptor {
            kind: StatementKind::Bank,
            bank_id: Some("99999999".to_string()),
            account_id: "123456789".to_string(),
            name: "FIRST NATIONAL".to_string(),
            currency: "USD".to_string(),
        }
    }

    fn statement_txn(fitid: &str, amount: &str) -> StatementTransaction {
        StatementTransaction {
            fitid: fitid.to_string(),
            posted_at: NaiveDate::from_ymd_opt(2024, 12, 5)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            amount: Decimal::from_str(amount).unwrap(),
            trn_type: "DEBIT".to_string(),
            name: "Coffee Shop".to_string(),
            memo: String::new(),
            check_number: String::new(),
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn import_creates_account_and_transactions() {
        let (_dir, pool) = test_db().await;
        let outcome = reconcile(&pool, "alice", &descriptor(), &[statement_txn("ABC123", "-12.34")])
            .await
            .unwrap();

        assert_eq!(outcome.created_count(), 1);
        assert_eq!(outcome.account.kind, StatementKind::Bank);
        assert_eq!(outcome.account.bank_id.as_deref(), Some("99999999"));
        assert_eq!(outcome.account.account_id, "123456789");

        let stored = get_recent_transactions(&pool, "alice", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fitid, "ABC123");
        assert_eq!(stored[0].amount.to_string(), "-12.34");
        assert!(!stored[0].is_categorized);
    }

    #[tokio::test]
    async fn second_import_creates_nothing() {
        let (_dir, pool) = test_db().await;
        let txns = [statement_txn("A", "-1.00"), statement_txn("B", "-2.00")];

        let first = reconcile(&pool, "alice", &descriptor(), &txns).await.unwrap();
        assert_eq!(first.created_count(), 2);

        let second = reconcile(&pool, "alice", &descriptor(), &txns).await.unwrap();
        assert_eq!(second.created_count(), 0);
        assert_eq!(second.account.id, first.account.id);

        let stored = get_recent_transactions(&pool, "alice", 10).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn amended_amount_with_same_fitid_is_ignored() {
        let (_dir, pool) = test_db().await;
        reconcile(&pool, "alice", &descriptor(), &[statement_txn("A", "-1.00")])
            .await
            .unwrap();
        let outcome = reconcile(&pool, "alice", &descriptor(), &[statement_txn("A", "-9.99")])
            .await
            .unwrap();
        assert_eq!(outcome.created_count(), 0);

        let stored = get_recent_transactions(&pool, "alice", 10).await.unwrap();
        assert_eq!(stored[0].amount.to_string(), "-1.00");
    }

    #[tokio::test]
    async fn account_display_name_first_write_wins() {
        let (_dir, pool) = test_db().await;
        reconcile(&pool, "alice", &descriptor(), &[statement_txn("A", "-1.00")])
            .await
            .unwrap();

        let mut renamed = descriptor();
        renamed.name = "SOMETHING ELSE".to_string();
        let outcome = reconcile(&pool, "alice", &renamed, &[statement_txn("B", "-2.00")])
            .await
            .unwrap();
        assert_eq!(outcome.account.name, "FIRST NATIONAL");
    }

    #[tokio::test]
    async fn differing_account_ids_are_distinct_accounts() {
        let (_dir, pool) = test_db().await;
        reconcile(&pool, "alice", &descriptor(), &[statement_txn("A", "-1.00")])
            .await
            .unwrap();

        let mut other = descriptor();
        other.account_id = "987654321".to_string();
        // Same FITID, different account: not a duplicate.
        let outcome = reconcile(&pool, "alice", &other, &[statement_txn("A", "-1.00")])
            .await
            .unwrap();
        assert_eq!(outcome.created_count(), 1);
        assert_eq!(get_accounts(&pool, "alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn owners_do_not_share_accounts() {
        let (_dir, pool) = test_db().await;
        reconcile(&pool, "alice", &descriptor(), &[statement_txn("A", "-1.00")])
            .await
            .unwrap();
        let outcome = reconcile(&pool, "bob", &descriptor(), &[statement_txn("A", "-1.00")])
            .await
            .unwrap();
        assert_eq!(outcome.created_count(), 1);
        assert_eq!(get_accounts(&pool, "alice").await.unwrap().len(), 1);
        assert_eq!(get_accounts(&pool, "bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn credit_card_account_round_trips_without_bank_id() {
        let (_dir, pool) = test_db().await;
        let cc = AccountDescriptor {
            kind: StatementKind::CreditCard,
            bank_id: None,
            account_id: "4111".to_string(),
            name: String::new(),
            currency: "USD".to_string(),
        };
        reconcile(&pool, "alice", &cc, &[statement_txn("CC1", "-20.00")])
            .await
            .unwrap();
        let accounts = get_accounts(&pool, "alice").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].bank_id, None);
        assert_eq!(accounts[0].kind, StatementKind::CreditCard);
    }

    #[tokio::test]
    async fn deleting_an_account_cascades_to_transactions() {
        let (_dir, pool) = test_db().await;
        let outcome = reconcile(&pool, "alice", &descriptor(), &[statement_txn("A", "-1.00")])
            .await
            .unwrap();

        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(outcome.account.id.0)
            .execute(&pool)
            .await
            .unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn recent_transactions_order_newest_first() {
        let (_dir, pool) = test_db().await;
        let mut older = statement_txn("OLD", "-1.00");
        older.posted_at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let newer = statement_txn("NEW", "-2.00");
        reconcile(&pool, "alice", &descriptor(), &[older, newer])
            .await
            .unwrap();

        let stored = get_recent_transactions(&pool, "alice", 10).await.unwrap();
        assert_eq!(stored[0].fitid, "NEW");
        assert_eq!(stored[1].fitid, "OLD");
    }
}
