//! SQLite TicketStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Alias, Expr, OnConflict, Order, Query, SelectStatement, SqliteQueryBuilder};
use uuid::Uuid;

use super::cycle_store::status_of;
use super::{begin_immediate, finish, rows, SqliteStore};
use crate::model::{CycleStatus, NewTicket, Ticket};
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::Tickets;
use crate::storage::{Result, TicketStore};

fn select_tickets() -> SelectStatement {
    Query::select()
        .columns([
            Tickets::Id,
            Tickets::UserId,
            Tickets::CycleId,
            Tickets::SourceAction,
            Tickets::SourceId,
            Tickets::Multiplier,
            Tickets::TicketNumber,
            Tickets::CreatedAt,
        ])
        .from(Tickets::Table)
        .to_owned()
}

#[async_trait]
impl TicketStore for SqliteStore {
    async fn insert_ticket(&self, new_ticket: NewTicket) -> Result<Option<Ticket>> {
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

        // The unique index on the source columns decides duplicates.
        let query = Query::insert()
            .into_table(Tickets::Table)
            .columns([
                Tickets::Id,
                Tickets::UserId,
                Tickets::CycleId,
                Tickets::SourceAction,
                Tickets::SourceId,
                Tickets::Multiplier,
                Tickets::TicketNumber,
                Tickets::CreatedAt,
            ])
            .values_panic([
                ticket.id.to_string().into(),
                ticket.user_id.to_string().into(),
                ticket.cycle_id.to_string().into(),
                ticket.source_action.as_str().into(),
                ticket.source_id.clone().into(),
                ticket.multiplier.into(),
                ticket.ticket_number.into(),
                format_timestamp(ticket.created_at).into(),
            ])
            .on_conflict(
                OnConflict::columns([Tickets::UserId, Tickets::CycleId, Tickets::SourceAction, Tickets::SourceId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result: Result<Option<Ticket>> = async {
            if status_of(&mut conn, ticket.cycle_id).await? != CycleStatus::Active {
                return Ok(None);
            }
            let inserted = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();
            Ok((inserted == 1).then_some(ticket))
        }
        .await;

        finish(&mut conn, result).await
    }

    async fn tickets_with_number(&self, cycle_id: Uuid, number: u32) -> Result<Vec<Ticket>> {
        let query = select_tickets()
            .and_where(Expr::col(Tickets::CycleId).eq(cycle_id.to_string()))
            .and_where(Expr::col(Tickets::TicketNumber).eq(number))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::ticket).collect()
    }

    async fn tickets_for_user(&self, cycle_id: Uuid, user_id: Uuid) -> Result<Vec<Ticket>> {
        let query = select_tickets()
            .and_where(Expr::col(Tickets::CycleId).eq(cycle_id.to_string()))
            .and_where(Expr::col(Tickets::UserId).eq(user_id.to_string()))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let fetched = sqlx::query(&query).fetch_all(&self.pool).await?;
        fetched.iter().map(rows::ticket).collect()
    }
}
