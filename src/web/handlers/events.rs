//! Event browsing for everyone, event management for organizers.

use crate::core::event::{self, EventFilter, EventInput};
use crate::core::user::Principal;
use crate::errors::Result;
use crate::web::AppState;
use crate::web::response::{created, empty_success, success};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;

/// Query of `GET /api/events`.
#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    /// Return at most this many events
    pub limit: Option<u64>,
}

/// `GET /api/events` - upcoming active events.
pub async fn upcoming(
    State(state): State<AppState>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Response> {
    let events = event::list_upcoming_events(&state.db, Utc::now(), query.limit).await?;
    Ok(success(events, "Events retrieved"))
}

/// `GET /api/events/search`
pub async fn search(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Result<Response> {
    let events = event::search_events(&state.db, &filter, Utc::now()).await?;
    Ok(success(events, "Events retrieved"))
}

/// `GET /api/events/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Response> {
    let categories = event::list_categories(&state.db).await?;
    Ok(success(categories, "Categories retrieved"))
}

/// `GET /api/events/mine` (Organizer)
pub async fn mine(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let events = event::list_events_for_organizer(&state.db, &principal).await?;
    Ok(success(events, "Events retrieved"))
}

/// `GET /api/events/:id`
pub async fn details(State(state): State<AppState>, Path(event_id): Path<i64>) -> Result<Response> {
    let listing = event::get_event_listing(&state.db, event_id).await?;
    Ok(success(listing, "Event retrieved"))
}

/// `POST /api/events` (Organizer)
pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<EventInput>,
) -> Result<Response> {
    let created_event = event::create_event(&state.db, &principal, body, Utc::now()).await?;
    Ok(created(created_event, "Event created successfully"))
}

/// `PUT /api/events/:id` (owner)
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(event_id): Path<i64>,
    Json(body): Json<EventInput>,
) -> Result<Response> {
    let updated = event::update_event(&state.db, &principal, event_id, body).await?;
    Ok(success(updated, "Event updated successfully"))
}

/// `DELETE /api/events/:id` (owner)
pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(event_id): Path<i64>,
) -> Result<Response> {
    event::delete_event(&state.db, &principal, event_id).await?;
    Ok(empty_success("Event deleted successfully"))
}
