//! In-memory implementation of the storage interfaces.
//!
//! All state lives behind one `RwLock`; each trait method holds the write
//! lock for its whole mutation, which gives the same all-or-nothing behaviour
//! as a SQLite transaction. Batches are validated against a scratch copy of
//! the affected balances before anything is committed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    rollover_target, BalanceStore, CycleStore, DrawSettlement, Result, RevenueStore, SettlementReceipt, StorageError,
    TicketStore,
};
use crate::model::{
    Balance, Currency, Cycle, CycleStatus, EntryKind, LedgerBatch, LedgerEntry, NewCycle, NewPoolItem, NewRevenue,
    NewTicket, PoolItem, Posting, RevenueLedgerEntry, RevenueStatus, Ticket, Winner,
};


/// Account metadata kept alongside quantities.
#[derive(Debug, Clone, Default)]
struct Account {
    quantities: BTreeMap<Currency, i64>,
    daily_conversion_count: u32,
    daily_conversion_reset_date: Option<NaiveDate>,
    master_key_active: bool,
    master_key_expiry: Option<DateTime<Utc>>,
}

impl Account {
    fn to_balance(&self, user_id: Uuid) -> Balance {
        Balance {
            user_id,
            quantities: self.quantities.clone(),
            daily_conversion_count: self.daily_conversion_count,
            daily_conversion_reset_date: self.daily_conversion_reset_date,
            master_key_active: self.master_key_active,
            master_key_expiry: self.master_key_expiry,
        }
    }
}

/// Key for sourced-ticket uniqueness: (user, cycle, action, source_id).
type TicketKey = (Uuid, Uuid, String, String);

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    ledger: Vec<LedgerEntry>,
    cycles: HashMap<Uuid, Cycle>,
    tickets: Vec<Ticket>,
    ticket_keys: HashSet<TicketKey>,
    pool_items: Vec<PoolItem>,
    winners: Vec<Winner>,
    revenue: Vec<RevenueLedgerEntry>,
}

impl State {
    /// Validate a batch against scratch copies of the touched accounts, then
    /// commit it. Nothing is modified if any step fails.
    fn apply_batch(&mut self, batch: &LedgerBatch) -> Result<Vec<LedgerEntry>> {
        let mut scratch: HashMap<Uuid, Account> = HashMap::new();
        let touched = batch
            .postings
            .iter()
            .map(|p| p.user_id)
            .chain(batch.quota.iter().map(|q| q.user_id))
            .chain(batch.master_key.iter().map(|m| m.user_id));
        for user_id in touched {
            scratch
                .entry(user_id)
                .or_insert_with(|| self.accounts.get(&user_id).cloned().unwrap_or_default());
        }

        if let Some(claim) = &batch.quota {
            let account = scratch.entry(claim.user_id).or_default();
            let total = claim
                .apply(account.daily_conversion_count, account.daily_conversion_reset_date)
                .map_err(|used| StorageError::QuotaExceeded {
                    user_id: claim.user_id,
                    used,
                    requested: claim.units,
                    cap: claim.cap,
                })?;
            account.daily_conversion_count = total;
            account.daily_conversion_reset_date = Some(claim.date);
        }

        for posting in &batch.postings {
            let account = scratch.entry(posting.user_id).or_default();
            let quantity = account.quantities.entry(posting.currency).or_insert(0);
            if posting.kind == EntryKind::Spend && *quantity < posting.amount {
                return Err(StorageError::InsufficientFunds {
                    user_id: posting.user_id,
                    currency: posting.currency,
                    available: *quantity,
                    requested: posting.amount,
                });
            }
            *quantity = quantity
                .checked_add(posting.signed_amount())
                .ok_or(StorageError::AmountOverflow {
                    current: *quantity,
                    amount: posting.amount,
                })?;
        }

        if let Some(grant) = &batch.master_key {
            let account = scratch.entry(grant.user_id).or_default();
            account.master_key_expiry = Some(grant.expiry_after(account.master_key_active, account.master_key_expiry));
            account.master_key_active = true;
        }

        self.accounts.extend(scratch);
        Ok(batch.postings.iter().map(|p| self.append_entry(p)).collect())
    }

    fn append_entry(&mut self, posting: &Posting) -> LedgerEntry {
        let entry = LedgerEntry {
            id: self.ledger.len() as i64 + 1,
            user_id: posting.user_id,
            currency: posting.currency,
            signed_amount: posting.signed_amount(),
            kind: posting.kind,
            source: posting.source.clone(),
            reference_id: posting.reference_id.clone(),
            description: posting.description.clone(),
            created_at: Utc::now(),
        };
        self.ledger.push(entry.clone());
        entry
    }

    fn cycle_mut(&mut self, cycle_id: Uuid) -> Result<&mut Cycle> {
        self.cycles.get_mut(&cycle_id).ok_or(StorageError::CycleNotFound(cycle_id))
    }
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `Unavailable` until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for InMemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<Balance> {
        let mut state = self.state.write().await;
        Ok(state.accounts.entry(user_id).or_default().to_balance(user_id))
    }

    async fn apply(&self, batch: LedgerBatch) -> Result<Vec<LedgerEntry>> {
        self.check_writable()?;
        self.state.write().await.apply_batch(&batch)
    }

    async fn ledger(&self, user_id: Uuid, currency: Option<Currency>) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id && currency.map_or(true, |c| e.currency == c))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CycleStore for InMemoryStore {
    async fn create_cycle(&self, new_cycle: NewCycle) -> Result<Cycle> {
        self.check_writable()?;
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
        self.state.write().await.cycles.insert(cycle.id, cycle.clone());
        Ok(cycle)
    }

    async fn get_cycle(&self, cycle_id: Uuid) -> Result<Option<Cycle>> {
        Ok(self.state.read().await.cycles.get(&cycle_id).cloned())
    }

    async fn active_cycle(&self, now: DateTime<Utc>) -> Result<Option<Cycle>> {
        let state = self.state.read().await;
        Ok(state
            .cycles
            .values()
            .filter(|c| c.status == CycleStatus::Active && c.contains(now))
            .min_by_key(|c| (c.start_at, c.id))
            .cloned())
    }

    async fn due_cycles(&self, now: DateTime<Utc>) -> Result<Vec<Cycle>> {
        let state = self.state.read().await;
        let mut due: Vec<Cycle> = state
            .cycles
            .values()
            .filter(|c| c.status != CycleStatus::Completed && c.end_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.end_at, c.id));
        Ok(due)
    }

    async fn add_to_jackpot(&self, cycle_id: Uuid, amount: i64) -> Result<i64> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let cycle = state.cycle_mut(cycle_id)?;
        if !cycle.status.accepts_jackpot() {
            return Err(StorageError::CycleStateConflict {
                cycle_id,
                expected: vec![CycleStatus::Active, CycleStatus::Calculating],
                actual: cycle.status,
            });
        }
        cycle.jackpot_amount = cycle
            .jackpot_amount
            .checked_add(amount)
            .ok_or(StorageError::AmountOverflow {
                current: cycle.jackpot_amount,
                amount,
            })?;
        Ok(cycle.jackpot_amount)
    }

    async fn transition(&self, cycle_id: Uuid, from: CycleStatus, to: CycleStatus) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let cycle = state.cycle_mut(cycle_id)?;
        if cycle.status != from {
            return Ok(false);
        }
        cycle.status = to;
        Ok(true)
    }

    async fn record_winning_number(&self, cycle_id: Uuid, number: u32) -> Result<u32> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let cycle = state.cycle_mut(cycle_id)?;
        if cycle.status != CycleStatus::Calculating {
            return Err(StorageError::CycleStateConflict {
                cycle_id,
                expected: vec![CycleStatus::Calculating],
                actual: cycle.status,
            });
        }
        Ok(*cycle.winning_number.get_or_insert(number))
    }

    async fn add_pool_item(&self, cycle_id: Uuid, item: NewPoolItem) -> Result<PoolItem> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.cycle_mut(cycle_id)?;
        let pool_item = PoolItem {
            id: Uuid::new_v4(),
            cycle_id,
            reward_type: item.reward_type,
            amount: item.amount,
            description: item.description,
            sponsor_id: item.sponsor_id,
        };
        state.pool_items.push(pool_item.clone());
        Ok(pool_item)
    }

    async fn pool_items(&self, cycle_id: Uuid) -> Result<Vec<PoolItem>> {
        let state = self.state.read().await;
        Ok(state.pool_items.iter().filter(|p| p.cycle_id == cycle_id).cloned().collect())
    }

    async fn winners(&self, cycle_id: Uuid) -> Result<Vec<Winner>> {
        let state = self.state.read().await;
        Ok(state.winners.iter().filter(|w| w.cycle_id == cycle_id).cloned().collect())
    }

    async fn settle_draw(&self, settlement: DrawSettlement) -> Result<SettlementReceipt> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let (status, end_at, jackpot) = {
            let cycle = state.cycle_mut(settlement.cycle_id)?;
            (cycle.status, cycle.end_at, cycle.jackpot_amount)
        };
        if status != CycleStatus::Calculating {
            return Err(StorageError::CycleStateConflict {
                cycle_id: settlement.cycle_id,
                expected: vec![CycleStatus::Calculating],
                actual: status,
            });
        }
        if jackpot != settlement.jackpot {
            return Err(StorageError::JackpotChanged {
                cycle_id: settlement.cycle_id,
                expected: settlement.jackpot,
                actual: jackpot,
            });
        }

        // Resolve the rollover before any write so an overflow leaves nothing behind.
        let rollover = if settlement.carry_forward > 0 {
            let candidates = state.cycles.values().map(|c| (c.id, c.start_at, c.status));
            match rollover_target(candidates, settlement.cycle_id, end_at) {
                Some(target) => {
                    let current = state.cycle_mut(target)?.jackpot_amount;
                    let total = current
                        .checked_add(settlement.carry_forward)
                        .ok_or(StorageError::AmountOverflow {
                            current,
                            amount: settlement.carry_forward,
                        })?;
                    Some((target, total))
                }
                None => None,
            }
        } else {
            None
        };

        let entries = state.apply_batch(&LedgerBatch {
            postings: settlement.postings.clone(),
            ..Default::default()
        })?;

        let created_at = Utc::now();
        let winners: Vec<Winner> = settlement
            .winners
            .iter()
            .map(|w| Winner {
                id: Uuid::new_v4(),
                cycle_id: settlement.cycle_id,
                user_id: w.user_id,
                ticket_id: w.ticket_id,
                prize_description: w.prize_description.clone(),
                prize_data: w.prize_data,
                created_at,
            })
            .collect();
        state.winners.extend(winners.iter().cloned());

        if let Some((target, total)) = rollover {
            let cycle = state.cycle_mut(target)?;
            cycle.jackpot_amount = total;
            cycle.is_rollover = true;
        }
        let rollover_cycle_id = rollover.map(|(target, _)| target);

        let cycle = state.cycle_mut(settlement.cycle_id)?;
        cycle.status = CycleStatus::Completed;
        cycle.winning_number = Some(settlement.winning_number);

        Ok(SettlementReceipt {
            winners,
            entries,
            rollover_cycle_id,
        })
    }
}

#[async_trait]
impl TicketStore for InMemoryStore {
    async fn insert_ticket(&self, new_ticket: NewTicket) -> Result<Option<Ticket>> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let status = state
            .cycles
            .get(&new_ticket.cycle_id)
            .map(|c| c.status)
            .ok_or(StorageError::CycleNotFound(new_ticket.cycle_id))?;
        if status != CycleStatus::Active {
            return Ok(None);
        }

        if let Some(source_id) = &new_ticket.source_id {
            let key = (
                new_ticket.user_id,
                new_ticket.cycle_id,
                new_ticket.source_action.clone(),
                source_id.clone(),
            );
            if !state.ticket_keys.insert(key) {
                return Ok(None);
            }
        }

        let ticket = Ticket {
            id: Uuid::new_v4(),
            user_id: new_ticket.user_id,
            cycle_id: new_ticket.cycle_id,
            source_action: new_ticket.source_action,
            source_id: new_ticket.source_id,
            multiplier: new_ticket.multiplier,
            ticket_number: new_ticket.ticket_number,
            created_at: Utc::now(),
        };
        state.tickets.push(ticket.clone());
        Ok(Some(ticket))
    }

    async fn tickets_with_number(&self, cycle_id: Uuid, number: u32) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .iter()
            .filter(|t| t.cycle_id == cycle_id && t.ticket_number == number)
            .cloned()
            .collect())
    }

    async fn tickets_for_user(&self, cycle_id: Uuid, user_id: Uuid) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .iter()
            .filter(|t| t.cycle_id == cycle_id && t.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RevenueStore for InMemoryStore {
    async fn record_revenue(&self, revenue: NewRevenue, target_cycle: Option<Uuid>) -> Result<RevenueLedgerEntry> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let share = revenue.promoshare_share;
        let allocated_cycle_id = target_cycle.filter(|_| share > 0).and_then(|cycle_id| {
            let cycle = state.cycles.get_mut(&cycle_id)?;
            if !cycle.status.accepts_jackpot() {
                return None;
            }
            cycle.jackpot_amount = cycle.jackpot_amount.checked_add(share)?;
            Some(cycle_id)
        });

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
        state.revenue.push(entry.clone());
        Ok(entry)
    }

    async fn pending_revenue(&self) -> Result<Vec<RevenueLedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .revenue
            .iter()
            .filter(|r| r.status == RevenueStatus::Pending)
            .cloned()
            .collect())
    }
}
