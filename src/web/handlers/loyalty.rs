//! Loyalty balance of the caller.

use crate::core::{loyalty, pricing::POINT_VALUE, user::Principal};
use crate::errors::Result;
use crate::web::AppState;
use crate::web::response::success;
use axum::extract::State;
use axum::response::Response;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Serialize)]
struct Balance {
    user_id: i64,
    points: i64,
    /// What the points are worth at checkout
    value: Decimal,
}

/// `GET /api/loyalty` - the caller's balance.
pub async fn balance(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let points = loyalty::get_balance(&state.db, principal.user_id).await?;
    Ok(success(
        Balance {
            user_id: principal.user_id,
            points,
            value: Decimal::from(points) * POINT_VALUE,
        },
        "Loyalty balance retrieved",
    ))
}
