//! Loyalty point balances.
//!
//! One row per user, created lazily on first use. Balances only change through
//! single `UPDATE` statements so concurrent purchases cannot lose an update.

use crate::{
    entities::{LoyaltyPoint, loyalty_point},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, prelude::*, sea_query::Expr};
use tracing::{debug, instrument};

/// Loads the balance row for a user, if one exists.
pub async fn get_account<C>(db: &C, user_id: i64) -> Result<Option<loyalty_point::Model>>
where
    C: ConnectionTrait,
{
    LoyaltyPoint::find()
        .filter(loyalty_point::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Current balance; a user without a row has zero points.
pub async fn get_balance<C>(db: &C, user_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    Ok(get_account(db, user_id)
        .await?
        .map_or(0, |account| account.points))
}

/// Returns the user's balance row, creating an empty one if needed.
pub async fn ensure_account<C>(
    db: &C,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<loyalty_point::Model>
where
    C: ConnectionTrait,
{
    if let Some(account) = get_account(db, user_id).await? {
        return Ok(account);
    }

    debug!("Creating loyalty account for user {}", user_id);
    let account = loyalty_point::ActiveModel {
        user_id: Set(user_id),
        points: Set(0),
        last_updated: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(account)
}

/// Adds points to a user's balance.
///
/// # Errors
/// Returns [`Error::Validation`] for a negative amount.
#[instrument(skip(db))]
pub async fn credit_points<C>(
    db: &C,
    user_id: i64,
    points: i64,
    now: DateTime<Utc>,
) -> Result<i64>
where
    C: ConnectionTrait,
{
    if points < 0 {
        return Err(Error::validation("Cannot credit a negative number of points"));
    }
    ensure_account(db, user_id, now).await?;

    if points > 0 {
        LoyaltyPoint::update_many()
            .col_expr(
                loyalty_point::Column::Points,
                Expr::col(loyalty_point::Column::Points).add(points),
            )
            .col_expr(loyalty_point::Column::LastUpdated, Expr::value(now))
            .filter(loyalty_point::Column::UserId.eq(user_id))
            .exec(db)
            .await?;
    }

    get_balance(db, user_id).await
}

/// Removes points from a user's balance.
///
/// The update only applies while the stored balance still covers `points`, so
/// the balance never goes negative even under concurrent debits.
///
/// # Errors
/// Returns [`Error::InsufficientLoyaltyPoints`] if the balance is too low and
/// [`Error::Validation`] for a negative amount.
#[instrument(skip(db))]
pub async fn debit_points<C>(
    db: &C,
    user_id: i64,
    points: i64,
    now: DateTime<Utc>,
) -> Result<i64>
where
    C: ConnectionTrait,
{
    if points < 0 {
        return Err(Error::validation("Cannot debit a negative number of points"));
    }
    if points == 0 {
        return get_balance(db, user_id).await;
    }

    let result = LoyaltyPoint::update_many()
        .col_expr(
            loyalty_point::Column::Points,
            Expr::col(loyalty_point::Column::Points).sub(points),
        )
        .col_expr(loyalty_point::Column::LastUpdated, Expr::value(now))
        .filter(loyalty_point::Column::UserId.eq(user_id))
        .filter(loyalty_point::Column::Points.gte(points))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::InsufficientLoyaltyPoints {
            available: get_balance(db, user_id).await?,
            required: points,
        });
    }

    get_balance(db, user_id).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::Role;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_balance_defaults_to_zero() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "fan@example.com", Role::Customer).await?;

        assert_eq!(get_balance(&db, user.id).await?, 0);
        assert!(get_account(&db, user.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "fan@example.com", Role::Customer).await?;

        let first = ensure_account(&db, user.id, Utc::now()).await?;
        let second = ensure_account(&db, user.id, Utc::now()).await?;
        assert_eq!(first.id, second.id);
        assert_eq!(LoyaltyPoint::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_credit_and_debit() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "fan@example.com", Role::Customer).await?;
        let now = Utc::now();

        assert_eq!(credit_points(&db, user.id, 150, now).await?, 150);
        assert_eq!(credit_points(&db, user.id, 50, now).await?, 200);
        assert_eq!(debit_points(&db, user.id, 120, now).await?, 80);
        assert_eq!(debit_points(&db, user.id, 0, now).await?, 80);
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_never_goes_negative() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "fan@example.com", Role::Customer).await?;
        let now = Utc::now();
        credit_points(&db, user.id, 100, now).await?;

        let result = debit_points(&db, user.id, 101, now).await;
        match result {
            Err(Error::InsufficientLoyaltyPoints {
                available,
                required,
            }) => {
                assert_eq!(available, 100);
                assert_eq!(required, 101);
            }
            other => panic!("expected InsufficientLoyaltyPoints, got {other:?}"),
        }
        assert_eq!(get_balance(&db, user.id).await?, 100);

        // No row at all behaves like a zero balance
        let other = create_test_user(&db, "new@example.com", Role::Customer).await?;
        let result = debit_points(&db, other.id, 1, now).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientLoyaltyPoints { available: 0, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_amounts_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "fan@example.com", Role::Customer).await?;

        assert!(matches!(
            credit_points(&db, user.id, -5, Utc::now()).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            debit_points(&db, user.id, -5, Utc::now()).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }
}
