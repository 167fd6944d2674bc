//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Per-user account metadata (conversion counter, master key).
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "daily_conversion_count"]
    DailyConversionCount,
    #[iden = "daily_conversion_reset_date"]
    DailyConversionResetDate,
    #[iden = "master_key_active"]
    MasterKeyActive,
    #[iden = "master_key_expiry"]
    MasterKeyExpiry,
    #[iden = "created_at"]
    CreatedAt,
}

/// Per-user per-currency quantities.
#[derive(Iden)]
pub enum Balances {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "currency"]
    Currency,
    #[iden = "quantity"]
    Quantity,
}

/// Append-only ledger.
#[derive(Iden)]
pub enum LedgerEntries {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "currency"]
    Currency,
    #[iden = "amount"]
    Amount,
    #[iden = "kind"]
    Kind,
    #[iden = "source"]
    Source,
    #[iden = "reference_id"]
    ReferenceId,
    #[iden = "description"]
    Description,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
pub enum Cycles {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "cycle_type"]
    CycleType,
    #[iden = "start_at"]
    StartAt,
    #[iden = "end_at"]
    EndAt,
    #[iden = "status"]
    Status,
    #[iden = "jackpot_amount"]
    JackpotAmount,
    #[iden = "is_rollover"]
    IsRollover,
    #[iden = "config"]
    Config,
    #[iden = "winning_number"]
    WinningNumber,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
pub enum Tickets {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "cycle_id"]
    CycleId,
    #[iden = "source_action"]
    SourceAction,
    #[iden = "source_id"]
    SourceId,
    #[iden = "multiplier"]
    Multiplier,
    #[iden = "ticket_number"]
    TicketNumber,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
pub enum PoolItems {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "cycle_id"]
    CycleId,
    #[iden = "reward_type"]
    RewardType,
    #[iden = "amount"]
    Amount,
    #[iden = "description"]
    Description,
    #[iden = "sponsor_id"]
    SponsorId,
}

#[derive(Iden)]
pub enum Winners {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "cycle_id"]
    CycleId,
    #[iden = "user_id"]
    UserId,
    #[iden = "ticket_id"]
    TicketId,
    #[iden = "prize_description"]
    PrizeDescription,
    #[iden = "amount"]
    Amount,
    #[iden = "tier"]
    Tier,
    #[iden = "ticket_number"]
    TicketNumber,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
pub enum RevenueEntries {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "source_type"]
    SourceType,
    #[iden = "total_amount"]
    TotalAmount,
    #[iden = "promoshare_share"]
    PromoshareShare,
    #[iden = "status"]
    Status,
    #[iden = "allocated_cycle_id"]
    AllocatedCycleId,
    #[iden = "created_at"]
    CreatedAt,
}

/// Schema statements, applied in order by `SqliteStore::init`.
pub const CREATE_STATEMENTS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS accounts (
    user_id TEXT PRIMARY KEY,
    daily_conversion_count INTEGER NOT NULL DEFAULT 0,
    daily_conversion_reset_date TEXT,
    master_key_active INTEGER NOT NULL DEFAULT 0,
    master_key_expiry TEXT,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS balances (
    user_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
    PRIMARY KEY (user_id, currency)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    amount INTEGER NOT NULL,
    kind TEXT NOT NULL,
    source TEXT NOT NULL,
    reference_id TEXT,
    description TEXT,
    created_at TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_user_currency ON ledger_entries(user_id, currency)",
    r#"
CREATE TABLE IF NOT EXISTS cycles (
    id TEXT PRIMARY KEY,
    cycle_type TEXT NOT NULL,
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL,
    status TEXT NOT NULL,
    jackpot_amount INTEGER NOT NULL DEFAULT 0,
    is_rollover INTEGER NOT NULL DEFAULT 0,
    config TEXT NOT NULL,
    winning_number INTEGER,
    created_at TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_cycles_status_window ON cycles(status, start_at, end_at)",
    r#"
CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    cycle_id TEXT NOT NULL,
    source_action TEXT NOT NULL,
    source_id TEXT,
    multiplier REAL NOT NULL,
    ticket_number INTEGER NOT NULL,
    created_at TEXT NOT NULL
)"#,
    // NULL source_id values never collide, so unsourced tickets are unrestricted.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_source ON tickets(user_id, cycle_id, source_action, source_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_cycle_number ON tickets(cycle_id, ticket_number)",
    r#"
CREATE TABLE IF NOT EXISTS pool_items (
    id TEXT PRIMARY KEY,
    cycle_id TEXT NOT NULL,
    reward_type TEXT NOT NULL,
    amount INTEGER NOT NULL,
    description TEXT NOT NULL,
    sponsor_id TEXT
)"#,
    r#"
CREATE TABLE IF NOT EXISTS winners (
    id TEXT PRIMARY KEY,
    cycle_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    ticket_id TEXT NOT NULL,
    prize_description TEXT NOT NULL,
    amount INTEGER NOT NULL,
    tier TEXT NOT NULL,
    ticket_number INTEGER NOT NULL,
    created_at TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_winners_cycle ON winners(cycle_id)",
    r#"
CREATE TABLE IF NOT EXISTS revenue_entries (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    total_amount INTEGER NOT NULL,
    promoshare_share INTEGER NOT NULL,
    status TEXT NOT NULL,
    allocated_cycle_id TEXT,
    created_at TEXT NOT NULL
)"#,
];
