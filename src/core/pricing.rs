//! Ticket pricing - discount codes and loyalty redemption.
//!
//! [`compute_price`] is a pure function of its inputs: it never touches storage
//! and never mutates balances. Debiting the points it reports as consumed is the
//! job of ticket issuance, inside the issuance transaction.
//!
//! Order of application: the percentage discount comes off the base price first,
//! loyalty points then cover at most what is left. One point is worth one cent.

use crate::{
    core::{loyalty, user::Principal},
    entities::{Discount, Event, EventStatus, discount},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use sea_orm::prelude::*;
use serde::Serialize;

/// Monetary value of a single loyalty point.
pub const POINT_VALUE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Breakdown of what a customer pays for one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    /// Price before any reduction
    pub base_price: Decimal,
    /// Percentage of the applied discount code, if any
    pub discount_percentage: Option<i32>,
    /// Amount taken off by the discount code
    pub discount_amount: Decimal,
    /// Amount covered by loyalty points
    pub loyalty_deduction: Decimal,
    /// Points that cover `loyalty_deduction`
    pub points_used: i64,
    /// What is actually charged
    pub final_price: Decimal,
}

/// Checks a discount's switch and validity window against `now`.
///
/// Both bounds are inclusive; an unset bound is open.
pub fn check_discount(discount: &discount::Model, now: DateTime<Utc>) -> Result<()> {
    let reject = |reason: &str| Error::InvalidDiscount {
        code: discount.code.clone(),
        reason: reason.to_string(),
    };

    if !discount.is_active {
        return Err(reject("code is inactive"));
    }
    if discount.valid_from.is_some_and(|from| now < from) {
        return Err(reject("code is not valid yet"));
    }
    if discount.valid_to.is_some_and(|to| now > to) {
        return Err(reject("code has expired"));
    }
    Ok(())
}

/// Computes the final price for one ticket.
///
/// # Arguments
/// * `base_price` - Price before reductions, must not be negative
/// * `discount` - Discount looked up from the customer's code, if they gave one
/// * `use_loyalty` - Whether the customer wants to spend points
/// * `point_balance` - Points the customer currently holds
/// * `now` - Instant the discount window is checked against
///
/// # Errors
/// Returns [`Error::InvalidAmount`] for a negative base price and
/// [`Error::InvalidDiscount`] for a discount that is off or out of its window.
pub fn compute_price(
    base_price: Decimal,
    discount: Option<&discount::Model>,
    use_loyalty: bool,
    point_balance: i64,
    now: DateTime<Utc>,
) -> Result<PriceQuote> {
    if base_price < Decimal::ZERO {
        return Err(Error::InvalidAmount { amount: base_price });
    }

    let mut discount_amount = Decimal::ZERO;
    let mut discount_percentage = None;
    if let Some(discount) = discount {
        check_discount(discount, now)?;
        let percentage = discount.percentage.clamp(0, 100);
        discount_amount = (base_price * Decimal::from(percentage) / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .min(base_price);
        discount_percentage = Some(discount.percentage);
    }

    let remaining = base_price - discount_amount;

    let (loyalty_deduction, points_used) = if use_loyalty && point_balance > 0 {
        let max_loyalty_value = Decimal::from(point_balance) * POINT_VALUE;
        let deduction = max_loyalty_value.min(remaining);
        // Round partial cents up so the points always cover the deduction
        let points = (deduction / POINT_VALUE)
            .ceil()
            .to_i64()
            .unwrap_or(point_balance)
            .min(point_balance);
        (deduction, points)
    } else {
        (Decimal::ZERO, 0)
    };

    let final_price = (remaining - loyalty_deduction).max(Decimal::ZERO);

    Ok(PriceQuote {
        base_price,
        discount_percentage,
        discount_amount,
        loyalty_deduction,
        points_used,
        final_price,
    })
}

/// Finds a discount by code and checks it is usable at `now`.
///
/// # Errors
/// Returns [`Error::InvalidDiscount`] if the code is unknown, inactive or outside
/// its validity window.
pub async fn resolve_discount<C>(db: &C, code: &str, now: DateTime<Utc>) -> Result<discount::Model>
where
    C: ConnectionTrait,
{
    let code = code.trim();
    let discount = Discount::find()
        .filter(discount::Column::Code.eq(code))
        .one(db)
        .await?
        .ok_or_else(|| Error::InvalidDiscount {
            code: code.to_string(),
            reason: "unknown code".to_string(),
        })?;

    check_discount(&discount, now)?;
    Ok(discount)
}

/// Resolves an optional, possibly blank, discount code.
pub async fn resolve_optional_discount<C>(
    db: &C,
    code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<discount::Model>>
where
    C: ConnectionTrait,
{
    match code.map(str::trim) {
        Some(code) if !code.is_empty() => resolve_discount(db, code, now).await.map(Some),
        _ => Ok(None),
    }
}

/// Prices a ticket for the calling customer without changing anything.
///
/// Uses the stored event price and the caller's current loyalty balance.
pub async fn quote(
    db: &DatabaseConnection,
    principal: &Principal,
    event_id: i64,
    discount_code: Option<&str>,
    use_loyalty: bool,
    now: DateTime<Utc>,
) -> Result<PriceQuote> {
    let event = Event::find_by_id(event_id)
        .one(db)
        .await?
        .ok_or(Error::EventNotFound { event_id })?;
    if event.status != EventStatus::Active {
        return Err(Error::EventUnavailable { event_id });
    }

    let discount = resolve_optional_discount(db, discount_code, now).await?;
    let balance = loyalty::get_balance(db, principal.user_id).await?;

    compute_price(event.ticket_price, discount.as_ref(), use_loyalty, balance, now)
}
