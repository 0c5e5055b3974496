//! User entity - Represents an account holder of any role.
//!
//! Customers buy tickets, Organizers publish events and scan tickets at the door,
//! Admins manage everything including discount codes and reports.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role attached to an account, stored as its display name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Role {
    /// Buys tickets and collects loyalty points
    #[sea_orm(string_value = "Customer")]
    Customer,
    /// Publishes events and validates tickets
    #[sea_orm(string_value = "Organizer")]
    Organizer,
    /// Full administrative access
    #[sea_orm(string_value = "Admin")]
    Admin,
}

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name shown on tickets and reports
    pub user_name: String,
    /// Login email, unique across all users
    #[sea_orm(unique)]
    pub email: String,
    /// Base64-encoded SHA-256 of the password
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Account role
    pub role: Role,
    /// Optional path or URL of a profile picture
    pub profile_image: Option<String>,
    /// When the account was registered
    pub created_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Events organised by this user
    #[sea_orm(has_many = "super::event::Entity")]
    Events,
    /// Tickets purchased by this user
    #[sea_orm(has_many = "super::ticket::Entity")]
    Tickets,
    /// Loyalty balance of this user, created lazily
    #[sea_orm(has_one = "super::loyalty_point::Entity")]
    LoyaltyPoint,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickets.def()
    }
}

impl Related<super::loyalty_point::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoyaltyPoint.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
