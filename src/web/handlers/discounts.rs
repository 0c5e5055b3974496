//! Discount code administration (Admin).

use crate::core::discount::{self, DiscountInput};
use crate::core::user::Principal;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::response::{created, empty_success, success};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;

/// `GET /api/discounts`
pub async fn list(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let discounts = discount::list_discounts(&state.db, &principal).await?;
    Ok(success(discounts, "Discounts retrieved"))
}

/// `GET /api/discounts/:id`
pub async fn get(
    State(state): State<AppState>,
    principal: Principal,
    Path(discount_id): Path<i64>,
) -> Result<Response> {
    let found = discount::get_discount(&state.db, &principal, discount_id).await?;
    Ok(success(found, "Discount retrieved"))
}

/// `POST /api/discounts`
pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<DiscountInput>,
) -> Result<Response> {
    let saved = discount::create_discount(&state.db, &principal, body).await?;
    Ok(created(saved, "Discount created successfully"))
}

/// `PUT /api/discounts/:id`
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(discount_id): Path<i64>,
    Json(body): Json<DiscountInput>,
) -> Result<Response> {
    let saved = discount::update_discount(&state.db, &principal, discount_id, body).await?;
    Ok(success(saved, "Discount updated successfully"))
}

/// `DELETE /api/discounts/:id`
pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(discount_id): Path<i64>,
) -> Result<Response> {
    discount::delete_discount(&state.db, &principal, discount_id).await?;
    Ok(empty_success("Discount deleted successfully"))
}
