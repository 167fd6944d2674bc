//! SQLite CycleStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Alias, Expr, Order, Query, SelectStatement, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::balance_store::apply_postings;
use super::{begin_immediate, finish, rows, SqliteStore};
use crate::model::{Cycle, CycleStatus, NewCycle, NewPoolItem, PoolItem, Winner};
use crate::storage::helpers::{format_timestamp, parse_code};
use crate::storage::schema::{Cycles, PoolItems, Winners};
use crate::storage::{CycleStore, DrawSettlement, Result, SettlementReceipt, StorageError};

fn select_cycles() -> SelectStatement {
    Query::select()
        .columns([
            Cycles::Id,
            Cycles::CycleType,
            Cycles::StartAt,
            Cycles::EndAt,
            Cycles::Status,
            Cycles::JackpotAmount,
            Cycles::IsRollover,
            Cycles::Config,
            Cycles::WinningNumber,
            Cycles::CreatedAt,
        ])
        .from(Cycles::Table)
        .to_owned()
}

pub(super) async fn status_of(conn: &mut SqliteConnection, cycle_id: Uuid) -> Result<CycleStatus> {
    let query = Query::select()
        .column(Cycles::Status)
        .from(Cycles::Table)
        .and_where(Expr::col(Cycles::Id).eq(cycle_id.to_string()))
        .to_string(SqliteQueryBuilder);

    match sqlx::query(&query).fetch_optional(&mut *conn).await? {
        Some(row) => parse_code(&row.try_get::<String, _>("status")?),
        None => Err(StorageError::CycleNotFound(cycle_id)),
    }
}

async fn fetch_cycle(conn: &mut SqliteConnection, cycle_id: Uuid) -> Result<Option<Cycle>> {
    let query = select_cycles()
        .and_where(Expr::col(Cycles::Id).eq(cycle_id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(rows::cycle).transpose()
}

/// Increment a jackpot if the cycle still accepts contributions.
///
/// Returns `false` when the cycle exists but is completed, and fails with
/// `AmountOverflow` when the sum does not fit. Must run inside a write
/// transaction.
pub(super) async fn increment_jackpot(conn: &mut SqliteConnection, cycle_id: Uuid, amount: i64) -> Result<bool> {
    let query = Query::update()
        .table(Cycles::Table)
        .value(Cycles::JackpotAmount, Expr::col(Cycles::JackpotAmount).add(amount))
        .and_where(Expr::col(Cycles::Id).eq(cycle_id.to_string()))
        .and_where(Expr::col(Cycles::Status).is_in([CycleStatus::Active.as_str(), CycleStatus::Calculating.as_str()]))
        .and_where(Expr::col(Cycles::JackpotAmount).lte(i64::MAX.saturating_sub(amount)))
        .to_string(SqliteQueryBuilder);

    let updated = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();
    if updated == 0 {
        let cycle = fetch_cycle(conn, cycle_id)
            .await?
            .ok_or(StorageError::CycleNotFound(cycle_id))?;
        if cycle.status.accepts_jackpot() {
            return Err(StorageError::AmountOverflow {
                current: cycle.jackpot_amount,
                amount,
            });
        }
        return Ok(false);
    }
    Ok(true)
}

async fn settle(conn: &mut SqliteConnection, settlement: &DrawSettlement) -> Result<SettlementReceipt> {
    let cycle = fetch_cycle(conn, settlement.cycle_id)
        .await?
        .ok_or(StorageError::CycleNotFound(settlement.cycle_id))?;
    if cycle.status != CycleStatus::Calculating {
        return Err(StorageError::CycleStateConflict {
            cycle_id: cycle.id,
            expected: vec![CycleStatus::Calculating],
            actual: cycle.status,
        });
    }
    if cycle.jackpot_amount != settlement.jackpot {
        return Err(StorageError::JackpotChanged {
            cycle_id: cycle.id,
            expected: settlement.jackpot,
            actual: cycle.jackpot_amount,
        });
    }

    let entries = apply_postings(conn, &settlement.postings).await?;

    let created_at = Utc::now();
    let mut winners = Vec::with_capacity(settlement.winners.len());
    for new_winner in &settlement.winners {
        let winner = Winner {
            id: Uuid::new_v4(),
            cycle_id: cycle.id,
            user_id: new_winner.user_id,
            ticket_id: new_winner.ticket_id,
            prize_description: new_winner.prize_description.clone(),
            prize_data: new_winner.prize_data,
            created_at,
        };

        let query = Query::insert()
            .into_table(Winners::Table)
            .columns([
                Winners::Id,
                Winners::CycleId,
                Winners::UserId,
                Winners::TicketId,
                Winners::PrizeDescription,
                Winners::Amount,
                Winners::Tier,
                Winners::TicketNumber,
                Winners::CreatedAt,
            ])
            .values_panic([
                winner.id.to_string().into(),
                winner.cycle_id.to_string().into(),
                winner.user_id.to_string().into(),
                winner.ticket_id.to_string().into(),
                winner.prize_description.as_str().into(),
                winner.prize_data.amount.into(),
                winner.prize_data.tier.as_str().into(),
                winner.prize_data.ticket_number.into(),
                format_timestamp(created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        winners.push(winner);
    }

    let mut rollover_cycle_id = None;
    if settlement.carry_forward > 0 {
        let query = Query::select()
            .column(Cycles::Id)
            .from(Cycles::Table)
            .and_where(Expr::col(Cycles::Id).ne(cycle.id.to_string()))
            .and_where(Expr::col(Cycles::Status).ne(CycleStatus::Completed.as_str()))
            .and_where(Expr::col(Cycles::StartAt).gte(format_timestamp(cycle.end_at)))
            .order_by(Cycles::StartAt, Order::Asc)
            .order_by(Cycles::Id, Order::Asc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        if let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? {
            let target = crate::storage::helpers::parse_uuid(&row.try_get::<String, _>("id")?)?;
            let query = Query::update()
                .table(Cycles::Table)
                .value(Cycles::JackpotAmount, Expr::col(Cycles::JackpotAmount).add(settlement.carry_forward))
                .value(Cycles::IsRollover, true)
                .and_where(Expr::col(Cycles::Id).eq(target.to_string()))
                .and_where(Expr::col(Cycles::JackpotAmount).lte(i64::MAX.saturating_sub(settlement.carry_forward)))
                .to_string(SqliteQueryBuilder);

            if sqlx::query(&query).execute(&mut *conn).await?.rows_affected() == 0 {
                let current = fetch_cycle(conn, target)
                    .await?
                    .map_or(0, |c| c.jackpot_amount);
                return Err(StorageError::AmountOverflow {
                    current,
                    amount: settlement.carry_forward,
                });
            }
            rollover_cycle_id = Some(target);
        }
    }

    let query = Query::update()
        .table(Cycles::Table)
        .value(Cycles::Status, CycleStatus::Completed.as_str())
        .value(Cycles::WinningNumber, settlement.winning_number)
        .and_where(Expr::col(Cycles::Id).eq(cycle.id.to_string()))
        .and_where(Expr::col(Cycles::Status).eq(CycleStatus::Calculating.as_str()))
        .to_string(SqliteQueryBuilder);

    sqlx::query(&query).execute(&mut *conn).await?;

    Ok(SettlementReceipt {
        winners,
        entries,
        rollover_cycle_id,
    })
}

#[async_trait]
impl CycleStore for SqliteStore {
    async fn create_cycle(&self, new_cycle: NewCycle) -> Result<Cycle> {
        let cycle = Cycle {
            id: Uuid::new_v4(),
            cycle_type: new_cycle.cycle_type,
            start_at: new_cycle.start_at,
            end_at: new_cycle.end_at,
            status: CycleStatus::Active,
            jackpot_amount: 0,
            is_rollover: false,
            config: new_cycle.config,
            winning_number: None,
            created_at: Utc::now(),
        };

        let query = Query::insert()
            .into_table(Cycles::Table)
            .columns([
                Cycles::Id,
                Cycles::CycleType,
                Cycles::StartAt,
                Cycles::EndAt,
                Cycles::Status,
                Cycles::JackpotAmount,
                Cycles::IsRollover,
                Cycles::Config,
                Cycles::CreatedAt,
            ])
            .values_panic([
                cycle.id.to_string().into(),
                cycle.cycle_type.as_str().into(),
                format_timestamp(cycle.start_at).into(),
                format_timestamp(cycle.end_at).into(),
                cycle.status.as_str().into(),
                cycle.jackpot_amount.into(),
                cycle.is_rollover.into(),
                serde_json::to_string(&cycle.config)?.into(),
                format_timestamp(cycle.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(cycle)
    }

    async fn get_cycle(&self, cycle_id: Uuid) -> Result<Option<Cycle>> {
        let mut conn = self.pool.acquire().await?;
        fetch_cycle(&mut conn, cycle_id).await
    }

    async fn active_cycle(&self, now: DateTime<Utc>) -> Result<Option<Cycle>> {
        let now = format_timestamp(now);
        let query = select_cycles()
            .and_where(Expr::col(Cycles::Status).eq(CycleStatus::Active.as_str()))
            .and_where(Expr::col(Cycles::StartAt).lte(now.as_str()))
            .and_where(Expr::col(Cycles::EndAt).gt(now.as_str()))
            .order_by(Cycles::StartAt, Order::Asc)
            .order_by(Cycles::Id, Order::Asc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(rows::cycle).transpose()
    }

    async fn due_cycles(&self, now: DateTime<Utc>) -> Result<Vec<Cycle>> {
        let query = select_cycles()
            .and_where(Expr::col(Cycles::Status).ne(CycleStatus::Completed.as_str()))
            .and_where(Expr::col(Cycles::EndAt).lte(format_timestamp(now)))
            .order_by(Cycles::EndAt, Order::Asc)
            .order_by(Cycles::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::cycle).collect()
    }

    async fn add_to_jackpot(&self, cycle_id: Uuid, amount: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result: Result<i64> = async {
            if !increment_jackpot(&mut conn, cycle_id, amount).await? {
                return Err(StorageError::CycleStateConflict {
                    cycle_id,
                    expected: vec![CycleStatus::Active, CycleStatus::Calculating],
                    actual: CycleStatus::Completed,
                });
            }
            let cycle = fetch_cycle(&mut conn, cycle_id)
                .await?
                .ok_or(StorageError::CycleNotFound(cycle_id))?;
            Ok(cycle.jackpot_amount)
        }
        .await;

        finish(&mut conn, result).await
    }

    async fn transition(&self, cycle_id: Uuid, from: CycleStatus, to: CycleStatus) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let query = Query::update()
            .table(Cycles::Table)
            .value(Cycles::Status, to.as_str())
            .and_where(Expr::col(Cycles::Id).eq(cycle_id.to_string()))
            .and_where(Expr::col(Cycles::Status).eq(from.as_str()))
            .to_string(SqliteQueryBuilder);

        let updated = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();
        if updated == 1 {
            return Ok(true);
        }
        status_of(&mut conn, cycle_id).await?;
        Ok(false)
    }

    async fn record_winning_number(&self, cycle_id: Uuid, number: u32) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result: Result<u32> = async {
            let query = Query::update()
                .table(Cycles::Table)
                .value(Cycles::WinningNumber, number)
                .and_where(Expr::col(Cycles::Id).eq(cycle_id.to_string()))
                .and_where(Expr::col(Cycles::Status).eq(CycleStatus::Calculating.as_str()))
                .and_where(Expr::col(Cycles::WinningNumber).is_null())
                .to_string(SqliteQueryBuilder);
            sqlx::query(&query).execute(&mut *conn).await?;

            let cycle = fetch_cycle(&mut conn, cycle_id)
                .await?
                .ok_or(StorageError::CycleNotFound(cycle_id))?;
            if cycle.status != CycleStatus::Calculating {
                return Err(StorageError::CycleStateConflict {
                    cycle_id,
                    expected: vec![CycleStatus::Calculating],
                    actual: cycle.status,
                });
            }
            cycle
                .winning_number
                .ok_or_else(|| StorageError::Corrupt(format!("cycle {} lost its winning number", cycle_id)))
        }
        .await;

        finish(&mut conn, result).await
    }

    async fn add_pool_item(&self, cycle_id: Uuid, item: NewPoolItem) -> Result<PoolItem> {
        let mut conn = self.pool.acquire().await?;
        status_of(&mut conn, cycle_id).await?;

        let pool_item = PoolItem {
            id: Uuid::new_v4(),
            cycle_id,
            reward_type: item.reward_type,
            amount: item.amount,
            description: item.description,
            sponsor_id: item.sponsor_id,
        };

        let query = Query::insert()
            .into_table(PoolItems::Table)
            .columns([
                PoolItems::Id,
                PoolItems::CycleId,
                PoolItems::RewardType,
                PoolItems::Amount,
                PoolItems::Description,
                PoolItems::SponsorId,
            ])
            .values_panic([
                pool_item.id.to_string().into(),
                cycle_id.to_string().into(),
                pool_item.reward_type.as_str().into(),
                pool_item.amount.into(),
                pool_item.description.as_str().into(),
                pool_item.sponsor_id.map(|id| id.to_string()).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(pool_item)
    }

    async fn pool_items(&self, cycle_id: Uuid) -> Result<Vec<PoolItem>> {
        let query = Query::select()
            .columns([
                PoolItems::Id,
                PoolItems::CycleId,
                PoolItems::RewardType,
                PoolItems::Amount,
                PoolItems::Description,
                PoolItems::SponsorId,
            ])
            .from(PoolItems::Table)
            .and_where(Expr::col(PoolItems::CycleId).eq(cycle_id.to_string()))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::pool_item).collect()
    }

    async fn winners(&self, cycle_id: Uuid) -> Result<Vec<Winner>> {
        let query = Query::select()
            .columns([
                Winners::Id,
                Winners::CycleId,
                Winners::UserId,
                Winners::TicketId,
                Winners::PrizeDescription,
                Winners::Amount,
                Winners::Tier,
                Winners::TicketNumber,
                Winners::CreatedAt,
            ])
            .from(Winners::Table)
            .and_where(Expr::col(Winners::CycleId).eq(cycle_id.to_string()))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::winner).collect()
    }

    async fn settle_draw(&self, settlement: DrawSettlement) -> Result<SettlementReceipt> {
        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = settle(&mut conn, &settlement).await;
        finish(&mut conn, result).await
    }
}
