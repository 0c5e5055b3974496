//! Payment entity - The charge recorded for a ticket. Written once, never updated.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Ticket this payment settles (one-to-one)
    #[sea_orm(unique)]
    pub ticket_id: i64,
    /// Amount charged
    pub amount: Decimal,
    /// When the charge happened
    pub payment_date: DateTimeUtc,
    /// Method label as reported by the checkout (e.g. "Card")
    pub payment_method: Option<String>,
    /// Settlement status, `"Completed"` for every stored row today
    pub status: String,
    /// Hosted checkout reference the charge was captured under; unset for free tickets
    #[sea_orm(unique)]
    pub provider_reference: Option<String>,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one ticket
    #[sea_orm(
        belongs_to = "super::ticket::Entity",
        from = "Column::TicketId",
        to = "super::ticket::Column::Id"
    )]
    Ticket,
}

impl Related<super::ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticket.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
