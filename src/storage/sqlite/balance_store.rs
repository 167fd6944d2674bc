//! SQLite BalanceStore implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{begin_immediate, finish, rows, SqliteStore};
use crate::model::{Balance, Currency, EntryKind, LedgerBatch, LedgerEntry, MasterKeyGrant, Posting, QuotaClaim};
use crate::storage::helpers::{format_date, format_timestamp, parse_code, parse_date, parse_timestamp};
use crate::storage::schema::{Accounts, Balances, LedgerEntries};
use crate::storage::{BalanceStore, Result, StorageError};

/// Create the account row if it does not exist yet.
async fn ensure_account(conn: &mut SqliteConnection, user_id: Uuid) -> Result<()> {
    let query = Query::insert()
        .into_table(Accounts::Table)
        .columns([Accounts::UserId, Accounts::CreatedAt])
        .values_panic([user_id.to_string().into(), format_timestamp(Utc::now()).into()])
        .on_conflict(OnConflict::column(Accounts::UserId).do_nothing().to_owned())
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

/// Stored quantity, or `None` if the balance row does not exist yet.
async fn stored_quantity(conn: &mut SqliteConnection, user_id: Uuid, currency: Currency) -> Result<Option<i64>> {
    let query = Query::select()
        .column(Balances::Quantity)
        .from(Balances::Table)
        .and_where(Expr::col(Balances::UserId).eq(user_id.to_string()))
        .and_where(Expr::col(Balances::Currency).eq(currency.code()))
        .to_string(SqliteQueryBuilder);

    match sqlx::query(&query).fetch_optional(&mut *conn).await? {
        Some(row) => Ok(Some(row.try_get("quantity")?)),
        None => Ok(None),
    }
}

async fn load_balance(conn: &mut SqliteConnection, user_id: Uuid) -> Result<Balance> {
    let query = Query::select()
        .columns([
            Accounts::DailyConversionCount,
            Accounts::DailyConversionResetDate,
            Accounts::MasterKeyActive,
            Accounts::MasterKeyExpiry,
        ])
        .from(Accounts::Table)
        .and_where(Expr::col(Accounts::UserId).eq(user_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let mut balance = Balance::empty(user_id);
    if let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? {
        let count: i64 = row.try_get("daily_conversion_count")?;
        let reset_date: Option<String> = row.try_get("daily_conversion_reset_date")?;
        let expiry: Option<String> = row.try_get("master_key_expiry")?;

        balance.daily_conversion_count = u32::try_from(count)
            .map_err(|_| StorageError::Corrupt(format!("daily_conversion_count out of range: {}", count)))?;
        balance.daily_conversion_reset_date = reset_date.as_deref().map(parse_date).transpose()?;
        balance.master_key_active = row.try_get("master_key_active")?;
        balance.master_key_expiry = expiry.as_deref().map(parse_timestamp).transpose()?;
    }

    let query = Query::select()
        .columns([Balances::Currency, Balances::Quantity])
        .from(Balances::Table)
        .and_where(Expr::col(Balances::UserId).eq(user_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let mut quantities = BTreeMap::new();
    for row in sqlx::query(&query).fetch_all(&mut *conn).await? {
        let currency: Currency = parse_code(&row.try_get::<String, _>("currency")?)?;
        quantities.insert(currency, row.try_get::<i64, _>("quantity")?);
    }
    balance.quantities = quantities;

    Ok(balance)
}

async fn claim_quota(conn: &mut SqliteConnection, claim: &QuotaClaim) -> Result<()> {
    let balance = load_balance(conn, claim.user_id).await?;
    let total = claim
        .apply(balance.daily_conversion_count, balance.daily_conversion_reset_date)
        .map_err(|used| StorageError::QuotaExceeded {
            user_id: claim.user_id,
            used,
            requested: claim.units,
            cap: claim.cap,
        })?;

    let query = Query::update()
        .table(Accounts::Table)
        .value(Accounts::DailyConversionCount, total)
        .value(Accounts::DailyConversionResetDate, format_date(claim.date))
        .and_where(Expr::col(Accounts::UserId).eq(claim.user_id.to_string()))
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

async fn grant_master_key(conn: &mut SqliteConnection, grant: &MasterKeyGrant) -> Result<()> {
    let balance = load_balance(conn, grant.user_id).await?;
    let expiry = grant.expiry_after(balance.master_key_active, balance.master_key_expiry);

    let query = Query::update()
        .table(Accounts::Table)
        .value(Accounts::MasterKeyActive, true)
        .value(Accounts::MasterKeyExpiry, format_timestamp(expiry))
        .and_where(Expr::col(Accounts::UserId).eq(grant.user_id.to_string()))
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

/// Apply one posting: conditional balance update plus its ledger entry.
///
/// Must run inside a write transaction.
async fn apply_posting(conn: &mut SqliteConnection, posting: &Posting) -> Result<LedgerEntry> {
    let user = posting.user_id.to_string();
    ensure_account(conn, posting.user_id).await?;

    match posting.kind {
        EntryKind::Spend => {
            let query = Query::update()
                .table(Balances::Table)
                .value(Balances::Quantity, Expr::col(Balances::Quantity).sub(posting.amount))
                .and_where(Expr::col(Balances::UserId).eq(user.as_str()))
                .and_where(Expr::col(Balances::Currency).eq(posting.currency.code()))
                .and_where(Expr::col(Balances::Quantity).gte(posting.amount))
                .to_string(SqliteQueryBuilder);

            let updated = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();
            if updated == 0 {
                let available = stored_quantity(conn, posting.user_id, posting.currency)
                    .await?
                    .unwrap_or(0);
                return Err(StorageError::InsufficientFunds {
                    user_id: posting.user_id,
                    currency: posting.currency,
                    available,
                    requested: posting.amount,
                });
            }
        }
        EntryKind::Earn => {
            let query = Query::update()
                .table(Balances::Table)
                .value(Balances::Quantity, Expr::col(Balances::Quantity).add(posting.amount))
                .and_where(Expr::col(Balances::UserId).eq(user.as_str()))
                .and_where(Expr::col(Balances::Currency).eq(posting.currency.code()))
                .and_where(Expr::col(Balances::Quantity).lte(i64::MAX.saturating_sub(posting.amount)))
                .to_string(SqliteQueryBuilder);

            let updated = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();
            if updated == 0 {
                // A row that exists but was not updated is at the ceiling.
                if let Some(current) = stored_quantity(conn, posting.user_id, posting.currency).await? {
                    return Err(StorageError::AmountOverflow {
                        current,
                        amount: posting.amount,
                    });
                }
                let query = Query::insert()
                    .into_table(Balances::Table)
                    .columns([Balances::UserId, Balances::Currency, Balances::Quantity])
                    .values_panic([user.as_str().into(), posting.currency.code().into(), posting.amount.into()])
                    .to_string(SqliteQueryBuilder);

                sqlx::query(&query).execute(&mut *conn).await?;
            }
        }
    }

    let created_at = Utc::now();
    let query = Query::insert()
        .into_table(LedgerEntries::Table)
        .columns([
            LedgerEntries::UserId,
            LedgerEntries::Currency,
            LedgerEntries::Amount,
            LedgerEntries::Kind,
            LedgerEntries::Source,
            LedgerEntries::ReferenceId,
            LedgerEntries::Description,
            LedgerEntries::CreatedAt,
        ])
        .values_panic([
            user.as_str().into(),
            posting.currency.code().into(),
            posting.signed_amount().into(),
            posting.kind.as_str().into(),
            posting.source.as_str().into(),
            posting.reference_id.clone().into(),
            posting.description.clone().into(),
            format_timestamp(created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);

    let id = sqlx::query(&query).execute(&mut *conn).await?.last_insert_rowid();

    Ok(LedgerEntry {
        id,
        user_id: posting.user_id,
        currency: posting.currency,
        signed_amount: posting.signed_amount(),
        kind: posting.kind,
        source: posting.source.clone(),
        reference_id: posting.reference_id.clone(),
        description: posting.description.clone(),
        created_at,
    })
}

/// Apply postings in order. Must run inside a write transaction.
pub(super) async fn apply_postings(conn: &mut SqliteConnection, postings: &[Posting]) -> Result<Vec<LedgerEntry>> {
    let mut entries = Vec::with_capacity(postings.len());
    for posting in postings {
        entries.push(apply_posting(conn, posting).await?);
    }
    Ok(entries)
}

async fn apply_batch(conn: &mut SqliteConnection, batch: &LedgerBatch) -> Result<Vec<LedgerEntry>> {
    if let Some(claim) = &batch.quota {
        ensure_account(conn, claim.user_id).await?;
        claim_quota(conn, claim).await?;
    }

    let entries = apply_postings(conn, &batch.postings).await?;

    if let Some(grant) = &batch.master_key {
        ensure_account(conn, grant.user_id).await?;
        grant_master_key(conn, grant).await?;
    }

    Ok(entries)
}

#[async_trait]
impl BalanceStore for SqliteStore {
    async fn balance(&self, user_id: Uuid) -> Result<Balance> {
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result: Result<Balance> = async {
            ensure_account(&mut conn, user_id).await?;
            load_balance(&mut conn, user_id).await
        }
        .await;

        finish(&mut conn, result).await
    }

    async fn apply(&self, batch: LedgerBatch) -> Result<Vec<LedgerEntry>> {
        if batch.postings.is_empty() && batch.quota.is_none() && batch.master_key.is_none() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = apply_batch(&mut conn, &batch).await;
        finish(&mut conn, result).await
    }

    async fn ledger(&self, user_id: Uuid, currency: Option<Currency>) -> Result<Vec<LedgerEntry>> {
        let mut query = Query::select();
        query
            .columns([
                LedgerEntries::Id,
                LedgerEntries::UserId,
                LedgerEntries::Currency,
                LedgerEntries::Amount,
                LedgerEntries::Kind,
                LedgerEntries::Source,
                LedgerEntries::ReferenceId,
                LedgerEntries::Description,
                LedgerEntries::CreatedAt,
            ])
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::UserId).eq(user_id.to_string()))
            .order_by(LedgerEntries::Id, Order::Asc);
        if let Some(currency) = currency {
            query.and_where(Expr::col(LedgerEntries::Currency).eq(currency.code()));
        }
        let query = query.to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::ledger_entry).collect()
    }
}
