//! Ticket entity - A purchased admission tied to one event and one user.
//!
//! `status` starts at `Valid` and moves exactly once, to `Used` on redemption or
//! `Cancelled` on cancellation. `price_paid` and `purchase_date` never change
//! after insert. `qr_code` holds the `STAREVENTS|ticket|event|user` payload.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TicketStatus {
    /// Issued and not yet scanned
    #[sea_orm(string_value = "Valid")]
    Valid,
    /// Scanned at the door
    #[sea_orm(string_value = "Used")]
    Used,
    /// Cancelled before use
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

/// Ticket database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    /// Unique identifier for the ticket
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Event the ticket admits to
    pub event_id: i64,
    /// Ticket holder
    pub user_id: i64,
    /// When the ticket was bought
    pub purchase_date: DateTimeUtc,
    /// Amount actually charged, after discount and loyalty redemption
    pub price_paid: Decimal,
    /// Lifecycle state
    pub status: TicketStatus,
    /// QR payload, set right after the row is inserted and the id is known
    pub qr_code: Option<String>,
}

/// Defines relationships between Ticket and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each ticket belongs to one event
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id"
    )]
    Event,
    /// Each ticket belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    /// One ticket has exactly one payment
    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
