//! Ticket issuance for qualifying user actions.
//!
//! Issuance is best effort: a missing cycle, a duplicate source or a storage
//! failure yields no ticket and never fails the action that earned it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{EconomyError, Result};
use crate::model::{CycleStatus, NewTicket, Ticket};
use crate::storage::{CycleStore, TicketStore};
use crate::utils::clock::Clock;
use crate::utils::random::NumberSource;

/// A user action that may earn a ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketRequest {
    pub user_id: Uuid,
    /// Cycle to enter. `None` means the currently active cycle.
    pub cycle_id: Option<Uuid>,
    pub source_action: String,
    /// Identifies the triggering object; at most one ticket per
    /// (user, cycle, action, source) when present.
    pub source_id: Option<String>,
    pub multiplier: f64,
}

impl TicketRequest {
    pub fn new(user_id: Uuid, source_action: impl Into<String>) -> Self {
        Self {
            user_id,
            cycle_id: None,
            source_action: source_action.into(),
            source_id: None,
            multiplier: 1.0,
        }
    }

    pub fn for_cycle(mut self, cycle_id: Uuid) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}

#[derive(Clone)]
pub struct TicketIssuer {
    cycles: Arc<dyn CycleStore>,
    tickets: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    numbers: Arc<dyn NumberSource>,
}

impl TicketIssuer {
    pub fn new(
        cycles: Arc<dyn CycleStore>,
        tickets: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        numbers: Arc<dyn NumberSource>,
    ) -> Self {
        Self {
            cycles,
            tickets,
            clock,
            numbers,
        }
    }

    /// Issue a ticket, logging and swallowing any failure.
    pub async fn issue_ticket(&self, request: TicketRequest) -> Option<Ticket> {
        let user_id = request.user_id;
        let action = request.source_action.clone();
        match self.try_issue_ticket(request).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(%user_id, %action, error = %e, "Ticket issuance failed");
                None
            }
        }
    }

    /// Issue a ticket, surfacing errors.
    ///
    /// `Ok(None)` when there is no eligible cycle, the cycle stopped being
    /// active before the insert, or the sourced ticket was already issued.
    #[tracing::instrument(name = "ticket.issue", skip_all, fields(user_id = %request.user_id, action = %request.source_action))]
    pub async fn try_issue_ticket(&self, request: TicketRequest) -> Result<Option<Ticket>> {
        if !(request.multiplier.is_finite() && request.multiplier > 0.0) {
            return Err(EconomyError::InvalidMultiplier(request.multiplier));
        }

        let now = self.clock.now();
        let cycle = match request.cycle_id {
            Some(cycle_id) => self
                .cycles
                .get_cycle(cycle_id)
                .await?
                .filter(|c| c.status == CycleStatus::Active && c.contains(now)),
            None => self.cycles.active_cycle(now).await?,
        };
        let Some(cycle) = cycle else {
            debug!("No active cycle, ticket skipped");
            return Ok(None);
        };

        let inserted = self
            .tickets
            .insert_ticket(NewTicket {
                user_id: request.user_id,
                cycle_id: cycle.id,
                source_action: request.source_action,
                source_id: request.source_id,
                multiplier: request.multiplier,
                ticket_number: self.numbers.draw(),
            })
            .await?;

        match &inserted {
            Some(ticket) => info!(
                ticket_id = %ticket.id,
                cycle_id = %cycle.id,
                ticket_number = ticket.ticket_number,
                "Ticket issued"
            ),
            None => debug!(cycle_id = %cycle.id, "Duplicate ticket source or cycle no longer active, skipped"),
        }
        Ok(inserted)
    }

    /// A user's tickets in a cycle.
    pub async fn tickets_for_user(&self, cycle_id: Uuid, user_id: Uuid) -> Result<Vec<Ticket>> {
        Ok(self.tickets.tickets_for_user(cycle_id, user_id).await?)
    }
}
