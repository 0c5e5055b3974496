//! Ticket endpoints: quotes, free claims, the caller's tickets and door scans.

use crate::core::pricing;
use crate::core::redemption;
use crate::core::ticket::{self, IssueTicketRequest, IssuedTicket, TicketDetails};
use crate::core::user::Principal;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::response::{created, success};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/tickets/quote`.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    /// Event to price
    pub event_id: i64,
    /// Optional discount code
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Spend loyalty points
    #[serde(default)]
    pub use_loyalty: bool,
}

/// Body of `POST /api/tickets/validate`.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// String read from the QR image
    pub qr_code: String,
}

/// A ticket plus the string to render into its QR image.
#[derive(Debug, Serialize)]
pub struct TicketWithCode<T: Serialize> {
    /// Ticket data
    #[serde(flatten)]
    pub ticket: T,
    /// Payload, signed when a QR signing secret is configured
    pub scannable_code: String,
}

/// `POST /api/tickets/quote`
pub async fn quote(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<QuoteRequest>,
) -> Result<Response> {
    let quote = pricing::quote(
        &state.db,
        &principal,
        body.event_id,
        body.discount_code.as_deref(),
        body.use_loyalty,
        Utc::now(),
    )
    .await?;
    Ok(success(quote, "Price calculated"))
}

/// Wraps an issued ticket with its scannable code.
pub(crate) fn with_code(
    state: &AppState,
    issued: IssuedTicket,
) -> Result<TicketWithCode<IssuedTicket>> {
    let scannable_code = ticket::scannable_code(&issued.ticket, state.scan_policy.signer.as_ref())?;
    Ok(TicketWithCode {
        ticket: issued,
        scannable_code,
    })
}

/// `POST /api/tickets` - claims a ticket whose final price is zero.
///
/// Paid tickets answer 402 and go through `/api/checkout` instead.
pub async fn purchase(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<IssueTicketRequest>,
) -> Result<Response> {
    let issued = ticket::claim_free_ticket(&state.db, &principal, body, Utc::now()).await?;
    Ok(created(with_code(&state, issued)?, "Ticket issued successfully"))
}

/// `GET /api/tickets` - the caller's tickets.
pub async fn list(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let tickets = ticket::get_tickets_for_user(&state.db, &principal).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

/// `GET /api/tickets/:id`
pub async fn details(
    State(state): State<AppState>,
    principal: Principal,
    Path(ticket_id): Path<i64>,
) -> Result<Response> {
    let details: TicketDetails = ticket::get_ticket_for_user(&state.db, &principal, ticket_id).await?;
    let scannable_code =
        ticket::scannable_code(&details.ticket, state.scan_policy.signer.as_ref())?;
    Ok(success(
        TicketWithCode {
            ticket: details,
            scannable_code,
        },
        "Ticket retrieved",
    ))
}

/// `POST /api/tickets/:id/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    principal: Principal,
    Path(ticket_id): Path<i64>,
) -> Result<Response> {
    let cancelled = ticket::cancel_ticket(&state.db, &principal, ticket_id).await?;
    Ok(success(cancelled, "Ticket cancelled"))
}

/// `POST /api/tickets/validate` (Organizer, Admin)
pub async fn validate(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<ScanRequest>,
) -> Result<Response> {
    let redemption = redemption::validate_scan(
        &state.db,
        &principal,
        &body.qr_code,
        &state.scan_policy,
        Utc::now(),
    )
    .await?;
    Ok(success(redemption, "Ticket validated successfully"))
}
