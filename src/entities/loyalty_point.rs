//! Loyalty point entity - One balance row per user, created on first use.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Loyalty point database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "loyalty_points")]
pub struct Model {
    /// Unique identifier for the balance row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the balance
    #[sea_orm(unique)]
    pub user_id: i64,
    /// Current balance; one point is worth one cent
    pub points: i64,
    /// When the balance last changed
    pub last_updated: DateTimeUtc,
}

/// Defines relationships between `LoyaltyPoint` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each balance belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
