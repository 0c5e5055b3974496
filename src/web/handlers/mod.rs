//! Request handlers. Each one extracts its inputs, calls a core operation and
//! wraps the result in the JSON envelope.

pub mod checkout;
pub mod discounts;
pub mod events;
pub mod loyalty;
pub mod reports;
pub mod tickets;
pub mod users;

use crate::web::response::success;
use axum::response::Response;
use serde::Serialize;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

/// Liveness probe.
pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "star-events",
    };

    success(payload, "Health check successful")
}
