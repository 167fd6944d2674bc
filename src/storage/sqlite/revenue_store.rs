//! SQLite RevenueStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Alias, Expr, Order, Query, SqliteQueryBuilder};
use uuid::Uuid;

use super::cycle_store::increment_jackpot;
use super::{begin_immediate, finish, rows, SqliteStore};
use crate::model::{NewRevenue, RevenueLedgerEntry, RevenueStatus};
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::RevenueEntries;
use crate::storage::{Result, RevenueStore, StorageError};

#[async_trait]
impl RevenueStore for SqliteStore {
    async fn record_revenue(&self, revenue: NewRevenue, target_cycle: Option<Uuid>) -> Result<RevenueLedgerEntry> {
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result: Result<RevenueLedgerEntry> = async {
            let allocated_cycle_id = match target_cycle.filter(|_| revenue.promoshare_share > 0) {
                Some(cycle_id) => match increment_jackpot(&mut conn, cycle_id, revenue.promoshare_share).await {
                    Ok(true) => Some(cycle_id),
                    Ok(false) | Err(StorageError::CycleNotFound(_)) | Err(StorageError::AmountOverflow { .. }) => None,
                    Err(e) => return Err(e),
                },
                None => None,
            };

            let entry = RevenueLedgerEntry {
                id: Uuid::new_v4(),
                source_type: revenue.source_type,
                total_amount: revenue.total_amount,
                promoshare_share: revenue.promoshare_share,
                status: if allocated_cycle_id.is_some() {
                    RevenueStatus::Allocated
                } else {
                    RevenueStatus::Pending
                },
                allocated_cycle_id,
                created_at: Utc::now(),
            };

            let query = Query::insert()
                .into_table(RevenueEntries::Table)
                .columns([
                    RevenueEntries::Id,
                    RevenueEntries::SourceType,
                    RevenueEntries::TotalAmount,
                    RevenueEntries::PromoshareShare,
                    RevenueEntries::Status,
                    RevenueEntries::AllocatedCycleId,
                    RevenueEntries::CreatedAt,
                ])
                .values_panic([
                    entry.id.to_string().into(),
                    entry.source_type.as_str().into(),
                    entry.total_amount.into(),
                    entry.promoshare_share.into(),
                    entry.status.as_str().into(),
                    entry.allocated_cycle_id.map(|id| id.to_string()).into(),
                    format_timestamp(entry.created_at).into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;
            Ok(entry)
        }
        .await;

        finish(&mut conn, result).await
    }

    async fn pending_revenue(&self) -> Result<Vec<RevenueLedgerEntry>> {
        let query = Query::select()
            .columns([
                RevenueEntries::Id,
                RevenueEntries::SourceType,
                RevenueEntries::TotalAmount,
                RevenueEntries::PromoshareShare,
                RevenueEntries::Status,
                RevenueEntries::AllocatedCycleId,
                RevenueEntries::CreatedAt,
            ])
            .from(RevenueEntries::Table)
            .and_where(Expr::col(RevenueEntries::Status).eq(RevenueStatus::Pending.as_str()))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::revenue_entry).collect()
    }
}
