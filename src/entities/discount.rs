//! Discount entity - A percentage-off promotion looked up by code at checkout.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discounts")]
pub struct Model {
    /// Unique identifier for the discount
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Code typed by the customer, unique
    #[sea_orm(unique)]
    pub code: String,
    /// Optional note shown in the admin console
    pub description: Option<String>,
    /// Percentage off the base price, 1 to 100
    pub percentage: i32,
    /// First instant the code is accepted, unbounded if None
    pub valid_from: Option<DateTimeUtc>,
    /// Last instant the code is accepted, unbounded if None
    pub valid_to: Option<DateTimeUtc>,
    /// Kill switch independent of the window
    pub is_active: bool,
}

/// `Discount` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
