//! Admin reports.

use crate::core::{report, user::Principal};
use crate::errors::Result;
use crate::web::AppState;
use crate::web::response::success;
use axum::extract::State;
use axum::response::Response;

/// `GET /api/reports/dashboard` (Admin)
pub async fn dashboard(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let stats = report::dashboard_stats(&state.db, &principal).await?;
    Ok(success(stats, "Dashboard statistics"))
}

/// `GET /api/reports/sales` (Admin)
pub async fn sales(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let rows = report::sales_report(&state.db, &principal).await?;
    Ok(success(rows, "Sales report"))
}

/// `GET /api/reports/events` (Admin)
pub async fn events(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let rows = report::events_report(&state.db, &principal).await?;
    Ok(success(rows, "Events report"))
}

/// `GET /api/reports/users` (Admin)
pub async fn users(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let rows = report::users_report(&state.db, &principal).await?;
    Ok(success(rows, "Users report"))
}
