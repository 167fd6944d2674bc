//! TicketStore trait definition.

use async_trait::async_trait;
use uuid::Uuid;

use super::Result;
use crate::model::{NewTicket, Ticket};

/// Interface for ticket persistence.
///
/// `(user_id, cycle_id, source_action, source_id)` is unique whenever
/// `source_id` is present. The backend enforces it; callers never check
/// before inserting.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a ticket into an `Active` cycle.
    ///
    /// Returns `None` if an identical sourced ticket exists or the cycle is
    /// no longer `Active`; the status check and the insert are atomic. Fails
    /// with `CycleNotFound` for an unknown cycle.
    async fn insert_ticket(&self, ticket: NewTicket) -> Result<Option<Ticket>>;

    /// Tickets in a cycle holding `number`.
    async fn tickets_with_number(&self, cycle_id: Uuid, number: u32) -> Result<Vec<Ticket>>;

    async fn tickets_for_user(&self, cycle_id: Uuid, user_id: Uuid) -> Result<Vec<Ticket>>;
}
