//! Jackpot draws.
//!
//! A draw picks a winning number, pays every ticket holding it and completes
//! the cycle. The number is recorded on the cycle before any ticket is
//! looked up. Payouts are planned in memory and written by a single
//! `settle_draw` call guarded on the cycle still being `Calculating`, so a
//! draw either settles once or not at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cycles::CycleManager;
use super::error::{EconomyError, Result};
use super::tiers::TierDirectory;
use crate::config::{DrawConfig, ForfeitPolicy};
use crate::model::{apply_bps, CycleStatus, NewWinner, Posting, PrizeData, Ticket, Tier, Winner};
use crate::storage::{CycleStore, DrawSettlement, TicketStore};
use crate::utils::random::NumberSource;
use crate::utils::retry::draw_backoff;

/// Source tag on jackpot credits.
pub const LOTTERY_WIN_SOURCE: &str = "lottery_win";
/// Source tag on forfeited shares credited to the house account.
pub const LOTTERY_FORFEIT_SOURCE: &str = "lottery_forfeit";

/// What a settled draw did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    pub cycle_id: Uuid,
    pub winning_number: u32,
    pub jackpot: i64,
    pub winners: Vec<Winner>,
    /// Sum credited to winners.
    pub paid_out: i64,
    /// Jackpot not paid to winners: free-tier reductions and the division
    /// remainder. Handled by the configured forfeit policy.
    pub forfeited: i64,
    /// Amount carried into another cycle's jackpot.
    pub carried_forward: i64,
    pub rollover_cycle_id: Option<Uuid>,
}

/// In-memory payout plan for one draw.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PayoutPlan {
    winners: Vec<NewWinner>,
    postings: Vec<Posting>,
    paid_out: i64,
    forfeited: i64,
    carry_forward: i64,
}

/// Split `jackpot` across `holders`.
///
/// Every holder gets `jackpot / N`; free-tier holders get
/// `free_tier_share_bps` of that. With no holders the whole jackpot carries
/// forward.
fn plan_payouts(cycle_id: Uuid, jackpot: i64, holders: &[(Ticket, Tier)], config: &DrawConfig) -> PayoutPlan {
    if holders.is_empty() {
        return PayoutPlan {
            winners: Vec::new(),
            postings: Vec::new(),
            paid_out: 0,
            forfeited: 0,
            carry_forward: jackpot,
        };
    }

    let base_share = jackpot / holders.len() as i64;
    let reference = Some(cycle_id.to_string());
    let mut winners = Vec::with_capacity(holders.len());
    let mut postings = Vec::with_capacity(holders.len());
    let mut paid_out = 0;

    for (ticket, tier) in holders {
        let amount = match tier {
            Tier::Premium => base_share,
            Tier::Free => apply_bps(base_share, config.free_tier_share_bps),
        };
        winners.push(NewWinner {
            user_id: ticket.user_id,
            ticket_id: ticket.id,
            prize_description: format!("Jackpot share ({} tier)", tier),
            prize_data: PrizeData {
                amount,
                tier: *tier,
                ticket_number: ticket.ticket_number,
            },
        });
        if amount > 0 {
            postings.push(
                Posting::earn(ticket.user_id, config.payout_currency, amount, LOTTERY_WIN_SOURCE)
                    .with_reference(reference.clone())
                    .with_description(Some(format!("Jackpot win, ticket {}", ticket.ticket_number))),
            );
            paid_out += amount;
        }
    }

    let forfeited = jackpot - paid_out;
    let mut carry_forward = 0;
    match config.forfeit_policy {
        ForfeitPolicy::Burn => {}
        ForfeitPolicy::Rollover => carry_forward = forfeited,
        ForfeitPolicy::Retain { house_account } => {
            if forfeited > 0 {
                postings.push(
                    Posting::earn(house_account, config.payout_currency, forfeited, LOTTERY_FORFEIT_SOURCE)
                        .with_reference(reference)
                        .with_description(Some("Unpaid jackpot share".to_string())),
                );
            }
        }
    }

    PayoutPlan {
        winners,
        postings,
        paid_out,
        forfeited,
        carry_forward,
    }
}

#[derive(Clone)]
pub struct DrawEngine {
    cycles: Arc<dyn CycleStore>,
    tickets: Arc<dyn TicketStore>,
    tiers: Arc<dyn TierDirectory>,
    numbers: Arc<dyn NumberSource>,
    manager: CycleManager,
    config: DrawConfig,
}

impl DrawEngine {
    pub fn new(
        cycles: Arc<dyn CycleStore>,
        tickets: Arc<dyn TicketStore>,
        tiers: Arc<dyn TierDirectory>,
        numbers: Arc<dyn NumberSource>,
        manager: CycleManager,
        config: DrawConfig,
    ) -> Self {
        Self {
            cycles,
            tickets,
            tiers,
            numbers,
            manager,
            config,
        }
    }

    /// Draw and settle a `Calculating` cycle.
    ///
    /// Any other status fails with `InvalidCycleState` and writes nothing.
    #[tracing::instrument(name = "draw.execute", skip_all, fields(%cycle_id))]
    pub async fn execute(&self, cycle_id: Uuid) -> Result<DrawOutcome> {
        let cycle = self
            .cycles
            .get_cycle(cycle_id)
            .await?
            .ok_or(EconomyError::CycleNotFound(cycle_id))?;
        if cycle.status != CycleStatus::Calculating {
            return Err(EconomyError::InvalidCycleState {
                cycle_id,
                expected: vec![CycleStatus::Calculating],
                actual: cycle.status,
            });
        }

        // The number is fixed before tickets are resolved; a retried draw
        // reuses it.
        let winning_number = match cycle.winning_number {
            Some(number) => {
                info!(winning_number = number, "Resuming draw with recorded winning number");
                number
            }
            None => self.cycles.record_winning_number(cycle_id, self.numbers.draw()).await?,
        };
        let tickets = self.tickets.tickets_with_number(cycle_id, winning_number).await?;

        let mut tier_of: HashMap<Uuid, Tier> = HashMap::new();
        let mut holders = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let tier = match tier_of.get(&ticket.user_id) {
                Some(tier) => *tier,
                None => {
                    let tier = self.tiers.tier(ticket.user_id).await?;
                    tier_of.insert(ticket.user_id, tier);
                    tier
                }
            };
            holders.push((ticket, tier));
        }

        let plan = plan_payouts(cycle_id, cycle.jackpot_amount, &holders, &self.config);
        if plan.forfeited > 0 {
            match self.config.forfeit_policy {
                ForfeitPolicy::Burn => info!(amount = plan.forfeited, "Unpaid jackpot share burned"),
                ForfeitPolicy::Retain { house_account } => {
                    info!(amount = plan.forfeited, %house_account, "Unpaid jackpot share retained")
                }
                ForfeitPolicy::Rollover => info!(amount = plan.forfeited, "Unpaid jackpot share rolled over"),
            }
        }

        let receipt = self
            .cycles
            .settle_draw(DrawSettlement {
                cycle_id,
                jackpot: cycle.jackpot_amount,
                winning_number,
                winners: plan.winners,
                postings: plan.postings,
                carry_forward: plan.carry_forward,
            })
            .await?;

        if plan.carry_forward > 0 && receipt.rollover_cycle_id.is_none() {
            warn!(
                amount = plan.carry_forward,
                "No future cycle to roll into, amount stays on completed cycle"
            );
        }
        info!(
            winning_number,
            winners = receipt.winners.len(),
            paid_out = plan.paid_out,
            rollover_cycle_id = ?receipt.rollover_cycle_id,
            "Draw settled"
        );

        Ok(DrawOutcome {
            cycle_id,
            winning_number,
            jackpot: cycle.jackpot_amount,
            winners: receipt.winners,
            paid_out: plan.paid_out,
            forfeited: plan.forfeited,
            carried_forward: if receipt.rollover_cycle_id.is_some() {
                plan.carry_forward
            } else {
                0
            },
            rollover_cycle_id: receipt.rollover_cycle_id,
        })
    }

    /// Draw every cycle whose window has closed by `now`.
    ///
    /// Cycles left `Calculating` by an earlier failed run are picked up
    /// again. Transient failures are retried with backoff; a cycle that
    /// still fails is logged and skipped.
    #[tracing::instrument(name = "draw.run_due", skip_all, fields(%now))]
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<DrawOutcome>> {
        let due = self.manager.due_cycles(now).await?;
        let mut outcomes = Vec::with_capacity(due.len());

        for cycle in due {
            let cycle_id = cycle.id;
            let result = (|| async {
                self.manager.begin_draw(cycle_id).await?;
                self.execute(cycle_id).await
            })
            .retry(draw_backoff(self.config.max_attempts))
            .when(|e: &EconomyError| e.is_transient())
            .notify(|e: &EconomyError, dur: Duration| {
                warn!(%cycle_id, error = %e, delay = ?dur, "Draw failed, retrying");
            })
            .await;

            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(%cycle_id, error = %e, "Draw failed"),
            }
        }
        Ok(outcomes)
    }
}
