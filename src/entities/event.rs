//! Event entity - An occasion published by an organizer that tickets are sold for.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Publication state of an event. Only `Active` events can be purchased.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum EventStatus {
    /// Listed and on sale
    #[sea_orm(string_value = "Active")]
    Active,
    /// Hidden from listings, not on sale
    #[sea_orm(string_value = "Inactive")]
    Inactive,
    /// Called off by the organizer
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

/// Event database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    /// Unique identifier for the event
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User id of the organizer who owns the event
    pub organizer_id: i64,
    /// Event title
    pub title: String,
    /// Free-form description
    pub description: Option<String>,
    /// Category used for filtering (e.g. "Music", "Theatre")
    pub category: Option<String>,
    /// Venue or address
    pub location: Option<String>,
    /// When the event starts
    pub event_date: DateTimeUtc,
    /// Base price of one ticket
    pub ticket_price: Decimal,
    /// Publication state
    pub status: EventStatus,
    /// When the event was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Event and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each event belongs to one organizer
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OrganizerId",
        to = "super::user::Column::Id"
    )]
    Organizer,
    /// One event has many tickets
    #[sea_orm(has_many = "super::ticket::Entity")]
    Tickets,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organizer.def()
    }
}

impl Related<super::ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
