//! Shared test utilities for star-events.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults. Fixtures insert rows
//! directly so a test of one core module does not depend on another's rules.

use crate::{
    core::user::hash_password,
    entities::{
        Event, EventStatus, Role, Ticket, TicketStatus, discount, event, ticket, user,
    },
    errors::Result,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sea_orm::sea_query::Expr;
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness; honours `RUST_LOG`.
/// Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a user with the given email and role.
///
/// # Defaults
/// * `user_name`: "Test User"
/// * password: "password"
/// * no loyalty row
pub async fn create_test_user(
    db: &DatabaseConnection,
    email: &str,
    role: Role,
) -> Result<user::Model> {
    let user = user::ActiveModel {
        user_name: Set("Test User".to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password("password")),
        role: Set(role),
        profile_image: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(user)
}

/// Creates an active event.
///
/// # Defaults
/// * title: "Test Event"
/// * category: "Music"
/// * location: "Colombo"
pub async fn create_test_event(
    db: &DatabaseConnection,
    organizer_id: i64,
    ticket_price: Decimal,
    event_date: DateTime<Utc>,
) -> Result<event::Model> {
    let event = event::ActiveModel {
        organizer_id: Set(organizer_id),
        title: Set("Test Event".to_string()),
        description: Set(Some("An event for tests".to_string())),
        category: Set(Some("Music".to_string())),
        location: Set(Some("Colombo".to_string())),
        event_date: Set(event_date),
        ticket_price: Set(ticket_price),
        status: Set(EventStatus::Active),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(event)
}

/// Creates an active discount with no validity window.
pub async fn create_test_discount(
    db: &DatabaseConnection,
    code: &str,
    percentage: i32,
) -> Result<discount::Model> {
    create_custom_discount(db, code, percentage, None, None, true).await
}

/// Creates a discount with custom parameters.
/// Use this when you need to test validity windows or the active switch.
pub async fn create_custom_discount(
    db: &DatabaseConnection,
    code: &str,
    percentage: i32,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    is_active: bool,
) -> Result<discount::Model> {
    let discount = discount::ActiveModel {
        code: Set(code.to_string()),
        description: Set(None),
        percentage: Set(percentage),
        valid_from: Set(valid_from),
        valid_to: Set(valid_to),
        is_active: Set(is_active),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(discount)
}

/// Creates an organizer (`org@example.com`), a customer (`fan@example.com`)
/// and an active event a week after `now`.
///
/// # Returns
/// The customer and the event
pub async fn customer_and_event(
    db: &DatabaseConnection,
    ticket_price: Decimal,
    now: DateTime<Utc>,
) -> Result<(user::Model, event::Model)> {
    let organizer = create_test_user(db, "org@example.com", Role::Organizer).await?;
    let customer = create_test_user(db, "fan@example.com", Role::Customer).await?;
    let event = create_test_event(db, organizer.id, ticket_price, now + Duration::days(7)).await?;
    Ok((customer, event))
}

/// Forces an event into `status`.
pub async fn set_event_status(
    db: &DatabaseConnection,
    event_id: i64,
    status: EventStatus,
) -> Result<()> {
    Event::update_many()
        .col_expr(event::Column::Status, Expr::value(status))
        .filter(event::Column::Id.eq(event_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Forces a ticket into `status`, bypassing the lifecycle checks.
pub async fn set_ticket_status(
    db: &DatabaseConnection,
    ticket_id: i64,
    status: TicketStatus,
) -> Result<()> {
    Ticket::update_many()
        .col_expr(ticket::Column::Status, Expr::value(status))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db)
        .await?;
    Ok(())
}
