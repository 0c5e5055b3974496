//! Event publishing and discovery.
//!
//! Organizers manage their own events; Admins may manage any. Discovery queries
//! only ever return `Active` events that have not started yet.

use crate::{
    core::user::Principal,
    entities::{Event, EventStatus, Ticket, User, event, ticket, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{Condition, QueryOrder, QuerySelect, Select, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Fields an organizer supplies when creating or editing an event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    /// Event title
    pub title: String,
    /// Long description
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form category such as "Music"
    #[serde(default)]
    pub category: Option<String>,
    /// Venue
    #[serde(default)]
    pub location: Option<String>,
    /// Start of the event
    pub event_date: DateTime<Utc>,
    /// Price of one ticket before discounts
    pub ticket_price: Decimal,
    /// Whether tickets are on sale
    #[serde(default = "default_status")]
    pub status: EventStatus,
}

const fn default_status() -> EventStatus {
    EventStatus::Active
}

/// Criteria for [`search_events`]. Every set field must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    /// Substring of the title or description
    pub search: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Calendar day (UTC) the event falls on
    pub date: Option<NaiveDate>,
    /// Substring of the location
    pub location: Option<String>,
}

/// Public view of an event with its organizer's name.
#[derive(Debug, Clone, Serialize)]
pub struct EventListing {
    /// The event itself
    #[serde(flatten)]
    pub event: event::Model,
    /// Display name of the organizer
    pub organizer_name: Option<String>,
}

impl From<(event::Model, Option<user::Model>)> for EventListing {
    fn from((event, organizer): (event::Model, Option<user::Model>)) -> Self {
        Self {
            event,
            organizer_name: organizer.map(|o| o.user_name),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn validate_input(input: &EventInput) -> Result<String> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(Error::validation("Event title cannot be empty"));
    }
    if input.ticket_price < Decimal::ZERO {
        return Err(Error::InvalidAmount {
            amount: input.ticket_price,
        });
    }
    Ok(title.to_string())
}

/// Loads an event the caller is allowed to modify.
async fn find_owned(
    db: &DatabaseConnection,
    principal: &Principal,
    event_id: i64,
) -> Result<event::Model> {
    let event = get_event(db, event_id).await?;
    if event.organizer_id != principal.user_id && !principal.is_admin() {
        return Err(Error::forbidden("only the event's organizer can change it"));
    }
    Ok(event)
}

/// Publishes a new event owned by the caller.
///
/// # Errors
/// Returns [`Error::Forbidden`] unless the caller is an Organizer or Admin,
/// [`Error::Validation`] for a blank title and [`Error::InvalidAmount`] for a
/// negative price.
#[instrument(skip(db, input), fields(title = %input.title))]
pub async fn create_event(
    db: &DatabaseConnection,
    principal: &Principal,
    input: EventInput,
    now: DateTime<Utc>,
) -> Result<event::Model> {
    if !principal.is_organizer() {
        return Err(Error::forbidden("only organizers can create events"));
    }
    let title = validate_input(&input)?;

    let created = event::ActiveModel {
        organizer_id: Set(principal.user_id),
        title: Set(title),
        description: Set(non_blank(input.description.as_deref())),
        category: Set(non_blank(input.category.as_deref())),
        location: Set(non_blank(input.location.as_deref())),
        event_date: Set(input.event_date),
        ticket_price: Set(input.ticket_price),
        status: Set(input.status),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Organizer {} created event {}", principal.user_id, created.id);
    Ok(created)
}

/// Replaces the editable fields of an event.
///
/// Tickets already sold keep the price they were bought at.
#[instrument(skip(db, input))]
pub async fn update_event(
    db: &DatabaseConnection,
    principal: &Principal,
    event_id: i64,
    input: EventInput,
) -> Result<event::Model> {
    let title = validate_input(&input)?;
    let existing = find_owned(db, principal, event_id).await?;

    let mut active: event::ActiveModel = existing.into();
    active.title = Set(title);
    active.description = Set(non_blank(input.description.as_deref()));
    active.category = Set(non_blank(input.category.as_deref()));
    active.location = Set(non_blank(input.location.as_deref()));
    active.event_date = Set(input.event_date);
    active.ticket_price = Set(input.ticket_price);
    active.status = Set(input.status);

    let updated = active.update(db).await?;
    info!("Updated event {}", updated.id);
    Ok(updated)
}

/// Deletes an event that has no tickets.
///
/// # Errors
/// Returns [`Error::Validation`] once any ticket was sold for the event; set its
/// status to `Cancelled` instead.
#[instrument(skip(db))]
pub async fn delete_event(
    db: &DatabaseConnection,
    principal: &Principal,
    event_id: i64,
) -> Result<()> {
    let event = find_owned(db, principal, event_id).await?;

    let sold = Ticket::find()
        .filter(ticket::Column::EventId.eq(event.id))
        .count(db)
        .await?;
    if sold > 0 {
        return Err(Error::validation("Cannot delete event with sold tickets"));
    }

    Event::delete_by_id(event.id).exec(db).await?;
    info!("Deleted event {}", event.id);
    Ok(())
}

/// Retrieves an event by id in any status.
///
/// # Errors
/// Returns [`Error::EventNotFound`] if it does not exist.
pub async fn get_event<C>(db: &C, event_id: i64) -> Result<event::Model>
where
    C: ConnectionTrait,
{
    Event::find_by_id(event_id)
        .one(db)
        .await?
        .ok_or(Error::EventNotFound { event_id })
}

/// Public details of an on-sale event.
pub async fn get_event_listing(db: &DatabaseConnection, event_id: i64) -> Result<EventListing> {
    Event::find_by_id(event_id)
        .filter(event::Column::Status.eq(EventStatus::Active))
        .find_also_related(User)
        .one(db)
        .await?
        .map(EventListing::from)
        .ok_or(Error::EventNotFound { event_id })
}

/// The caller's own events, newest first.
pub async fn list_events_for_organizer(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<event::Model>> {
    if !principal.is_organizer() {
        return Err(Error::forbidden("only organizers have events"));
    }
    Event::find()
        .filter(event::Column::OrganizerId.eq(principal.user_id))
        .order_by_desc(event::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

fn upcoming(now: DateTime<Utc>) -> Select<Event> {
    Event::find()
        .filter(event::Column::Status.eq(EventStatus::Active))
        .filter(event::Column::EventDate.gte(now))
        .order_by_asc(event::Column::EventDate)
}

/// Active events that have not started, soonest first.
pub async fn list_upcoming_events(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    limit: Option<u64>,
) -> Result<Vec<EventListing>> {
    let mut query = upcoming(now);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query
        .find_also_related(User)
        .all(db)
        .await?
        .into_iter()
        .map(EventListing::from)
        .collect())
}

/// Upcoming events matching every criterion set in `filter`.
pub async fn search_events(
    db: &DatabaseConnection,
    filter: &EventFilter,
    now: DateTime<Utc>,
) -> Result<Vec<EventListing>> {
    let mut query = upcoming(now);

    if let Some(text) = non_blank(filter.search.as_deref()) {
        query = query.filter(
            Condition::any()
                .add(event::Column::Title.contains(&text))
                .add(event::Column::Description.contains(&text)),
        );
    }
    if let Some(category) = non_blank(filter.category.as_deref()) {
        query = query.filter(event::Column::Category.eq(category));
    }
    if let Some(date) = filter.date {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        query = query
            .filter(event::Column::EventDate.gte(start))
            .filter(event::Column::EventDate.lt(start + Duration::days(1)));
    }
    if let Some(location) = non_blank(filter.location.as_deref()) {
        query = query.filter(event::Column::Location.contains(&location));
    }

    Ok(query
        .find_also_related(User)
        .all(db)
        .await?
        .into_iter()
        .map(EventListing::from)
        .collect())
}

/// Distinct categories of active events, alphabetical.
pub async fn list_categories(db: &DatabaseConnection) -> Result<Vec<String>> {
    let categories: Vec<Option<String>> = Event::find()
        .select_only()
        .column(event::Column::Category)
        .distinct()
        .filter(event::Column::Status.eq(EventStatus::Active))
        .filter(event::Column::Category.is_not_null())
        .order_by_asc(event::Column::Category)
        .into_tuple()
        .all(db)
        .await?;
    Ok(categories.into_iter().flatten().collect())
}
