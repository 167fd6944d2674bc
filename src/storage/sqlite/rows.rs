//! Row decoding for the SQLite backend.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::model::{Cycle, LedgerEntry, PoolItem, PrizeData, RevenueLedgerEntry, Ticket, Winner};
use crate::storage::helpers::{parse_code, parse_timestamp, parse_uuid};
use crate::storage::{Result, StorageError};

fn parse_optional_uuid(value: Option<String>) -> Result<Option<uuid::Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("{} out of range: {}", column, value)))
}

pub(super) fn ledger_entry(row: &SqliteRow) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        currency: parse_code(&row.try_get::<String, _>("currency")?)?,
        signed_amount: row.try_get("amount")?,
        kind: parse_code(&row.try_get::<String, _>("kind")?)?,
        source: row.try_get("source")?,
        reference_id: row.try_get("reference_id")?,
        description: row.try_get("description")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

pub(super) fn cycle(row: &SqliteRow) -> Result<Cycle> {
    let winning_number: Option<i64> = row.try_get("winning_number")?;
    Ok(Cycle {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        cycle_type: parse_code(&row.try_get::<String, _>("cycle_type")?)?,
        start_at: parse_timestamp(&row.try_get::<String, _>("start_at")?)?,
        end_at: parse_timestamp(&row.try_get::<String, _>("end_at")?)?,
        status: parse_code(&row.try_get::<String, _>("status")?)?,
        jackpot_amount: row.try_get("jackpot_amount")?,
        is_rollover: row.try_get("is_rollover")?,
        config: serde_json::from_str(&row.try_get::<String, _>("config")?)?,
        winning_number: winning_number.map(|n| to_u32(n, "winning_number")).transpose()?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

pub(super) fn ticket(row: &SqliteRow) -> Result<Ticket> {
    Ok(Ticket {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        cycle_id: parse_uuid(&row.try_get::<String, _>("cycle_id")?)?,
        source_action: row.try_get("source_action")?,
        source_id: row.try_get("source_id")?,
        multiplier: row.try_get("multiplier")?,
        ticket_number: to_u32(row.try_get("ticket_number")?, "ticket_number")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

pub(super) fn pool_item(row: &SqliteRow) -> Result<PoolItem> {
    Ok(PoolItem {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        cycle_id: parse_uuid(&row.try_get::<String, _>("cycle_id")?)?,
        reward_type: row.try_get("reward_type")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        sponsor_id: parse_optional_uuid(row.try_get("sponsor_id")?)?,
    })
}

pub(super) fn winner(row: &SqliteRow) -> Result<Winner> {
    Ok(Winner {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        cycle_id: parse_uuid(&row.try_get::<String, _>("cycle_id")?)?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        ticket_id: parse_uuid(&row.try_get::<String, _>("ticket_id")?)?,
        prize_description: row.try_get("prize_description")?,
        prize_data: PrizeData {
            amount: row.try_get("amount")?,
            tier: parse_code(&row.try_get::<String, _>("tier")?)?,
            ticket_number: to_u32(row.try_get("ticket_number")?, "ticket_number")?,
        },
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

pub(super) fn revenue_entry(row: &SqliteRow) -> Result<RevenueLedgerEntry> {
    Ok(RevenueLedgerEntry {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        source_type: row.try_get("source_type")?,
        total_amount: row.try_get("total_amount")?,
        promoshare_share: row.try_get("promoshare_share")?,
        status: parse_code(&row.try_get::<String, _>("status")?)?,
        allocated_cycle_id: parse_optional_uuid(row.try_get("allocated_cycle_id")?)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}
