//! Discount code administration. Every operation here is Admin only.

use crate::{
    core::user::Principal,
    entities::{Discount, discount},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;
use tracing::{info, instrument};

/// Fields an Admin supplies when creating or editing a discount.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountInput {
    /// Code customers type at checkout
    pub code: String,
    /// Free-text note shown in the admin list
    #[serde(default)]
    pub description: Option<String>,
    /// Percentage taken off the base price, 1 to 100
    pub percentage: i32,
    /// First instant the code is accepted
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    /// Last instant the code is accepted
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    /// Master switch
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

/// Checks input and returns the normalised code.
fn validate_input(input: &DiscountInput) -> Result<String> {
    let code = input.code.trim();
    if code.is_empty() {
        return Err(Error::validation("Discount code is required"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::validation(
            "Discount code may only contain letters, digits, '-' and '_'",
        ));
    }
    if !(1..=100).contains(&input.percentage) {
        return Err(Error::validation("Percentage must be between 1 and 100"));
    }
    if matches!((input.valid_from, input.valid_to), (Some(from), Some(to)) if from > to) {
        return Err(Error::validation("valid_from must not be after valid_to"));
    }
    Ok(code.to_string())
}

async fn ensure_code_free(
    db: &DatabaseConnection,
    code: &str,
    except_id: Option<i64>,
) -> Result<()> {
    let mut query = Discount::find().filter(discount::Column::Code.eq(code));
    if let Some(id) = except_id {
        query = query.filter(discount::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(Error::validation(format!("Discount code '{code}' already exists")));
    }
    Ok(())
}

fn description(input: &DiscountInput) -> Option<String> {
    input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(ToString::to_string)
}

/// Creates a discount code.
///
/// # Errors
/// Returns [`Error::Forbidden`] for non-admins and [`Error::Validation`] for a
/// bad or duplicate code, an out-of-range percentage or an inverted window.
#[instrument(skip(db, input), fields(code = %input.code))]
pub async fn create_discount(
    db: &DatabaseConnection,
    principal: &Principal,
    input: DiscountInput,
) -> Result<discount::Model> {
    principal.require_admin()?;
    let code = validate_input(&input)?;
    ensure_code_free(db, &code, None).await?;

    let created = discount::ActiveModel {
        code: Set(code),
        description: Set(description(&input)),
        percentage: Set(input.percentage),
        valid_from: Set(input.valid_from),
        valid_to: Set(input.valid_to),
        is_active: Set(input.is_active),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created discount {} ({}%)", created.code, created.percentage);
    Ok(created)
}

/// Replaces every field of an existing discount.
#[instrument(skip(db, input))]
pub async fn update_discount(
    db: &DatabaseConnection,
    principal: &Principal,
    discount_id: i64,
    input: DiscountInput,
) -> Result<discount::Model> {
    principal.require_admin()?;
    let code = validate_input(&input)?;

    let existing = Discount::find_by_id(discount_id)
        .one(db)
        .await?
        .ok_or(Error::DiscountNotFound { discount_id })?;
    ensure_code_free(db, &code, Some(discount_id)).await?;

    let mut active: discount::ActiveModel = existing.into();
    active.code = Set(code);
    active.description = Set(description(&input));
    active.percentage = Set(input.percentage);
    active.valid_from = Set(input.valid_from);
    active.valid_to = Set(input.valid_to);
    active.is_active = Set(input.is_active);

    let updated = active.update(db).await?;
    info!("Updated discount {}", updated.id);
    Ok(updated)
}

/// Deletes a discount. Tickets bought with it keep their price.
#[instrument(skip(db))]
pub async fn delete_discount(
    db: &DatabaseConnection,
    principal: &Principal,
    discount_id: i64,
) -> Result<()> {
    principal.require_admin()?;
    let result = Discount::delete_by_id(discount_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::DiscountNotFound { discount_id });
    }
    info!("Deleted discount {}", discount_id);
    Ok(())
}

/// All discounts ordered by code.
pub async fn list_discounts(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<discount::Model>> {
    principal.require_admin()?;
    Discount::find()
        .order_by_asc(discount::Column::Code)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Loads one discount by id.
pub async fn get_discount(
    db: &DatabaseConnection,
    principal: &Principal,
    discount_id: i64,
) -> Result<discount::Model> {
    principal.require_admin()?;
    Discount::find_by_id(discount_id)
        .one(db)
        .await?
        .ok_or(Error::DiscountNotFound { discount_id })
}
