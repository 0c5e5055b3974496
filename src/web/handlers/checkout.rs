//! Hosted checkout endpoints.

use crate::core::checkout::{self, CheckoutCallback};
use crate::core::user::Principal;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::handlers::tickets::{QuoteRequest, with_code};
use crate::web::response::{created, success};
use axum::Json;
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::Utc;

/// `POST /api/checkout` - prices the purchase and returns the provider URL.
pub async fn begin(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<QuoteRequest>,
) -> Result<Response> {
    let session = checkout::begin_checkout(
        &state.db,
        &state.config.checkout,
        &principal,
        body.event_id,
        body.discount_code,
        body.use_loyalty,
        Utc::now(),
    )
    .await?;
    Ok(success(session, "Checkout started"))
}

/// `GET /api/checkout/callback` - provider redirect after payment.
///
/// Authenticated by the provider signature, not by `X-User-Id`.
pub async fn callback(
    State(state): State<AppState>,
    Query(callback): Query<CheckoutCallback>,
) -> Result<Response> {
    let issued =
        checkout::complete_checkout(&state.db, &state.config.checkout, callback, Utc::now())
            .await?;
    Ok(created(with_code(&state, issued)?, "Payment successful"))
}
