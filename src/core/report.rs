//! Admin reporting.
//!
//! Figures are aggregated in Rust from the stored rows rather than with SQL
//! `SUM`, so money stays in `Decimal` end to end. All functions are Admin only.

use crate::{
    core::user::Principal,
    entities::{Event, EventStatus, Ticket, User, event, ticket},
    errors::Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use std::collections::HashMap;

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    /// Registered accounts of every role
    pub total_users: u64,
    /// Events in any status
    pub total_events: u64,
    /// Events currently on sale
    pub active_events: u64,
    /// Tickets ever issued, cancelled ones included
    pub total_tickets_sold: u64,
    /// Sum of `price_paid` over those tickets
    pub total_revenue: Decimal,
}

/// Sales figures for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSales {
    /// Event id
    pub event_id: i64,
    /// Event title
    pub event_title: String,
    /// Tickets issued for the event
    pub tickets_sold: u64,
    /// Sum of what those tickets were paid
    pub total_sales: Decimal,
}

/// Activity of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    /// User id
    pub user_id: i64,
    /// Display name
    pub user_name: String,
    /// Login email
    pub email: String,
    /// Account role
    pub role: crate::entities::Role,
    /// Events this user organizes
    pub events_organized: u64,
    /// Tickets this user bought, cancelled ones included
    pub tickets_purchased: u64,
}

/// One row of the events report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    /// Event id
    pub event_id: i64,
    /// Event title
    pub title: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Venue, if given
    pub location: Option<String>,
    /// Organizer's display name, if the account still exists
    pub organizer_name: Option<String>,
    /// Tickets issued for the event
    pub tickets_sold: u64,
}

async fn ticket_prices(db: &DatabaseConnection) -> Result<Vec<(i64, i64, Decimal)>> {
    Ticket::find()
        .select_only()
        .column(ticket::Column::EventId)
        .column(ticket::Column::UserId)
        .column(ticket::Column::PricePaid)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Counts and revenue across the whole system.
pub async fn dashboard_stats(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<DashboardStats> {
    principal.require_admin()?;

    let total_users = User::find().count(db).await?;
    let total_events = Event::find().count(db).await?;
    let active_events = Event::find()
        .filter(event::Column::Status.eq(EventStatus::Active))
        .count(db)
        .await?;

    let prices = ticket_prices(db).await?;
    let total_revenue = prices.iter().map(|(_, _, price)| *price).sum();

    Ok(DashboardStats {
        total_users,
        total_events,
        active_events,
        total_tickets_sold: prices.len() as u64,
        total_revenue,
    })
}

/// Tickets sold and revenue per event, in event creation order.
///
/// Events without sales are listed with zeros.
pub async fn sales_report(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<EventSales>> {
    principal.require_admin()?;

    let mut per_event: HashMap<i64, (u64, Decimal)> = HashMap::new();
    for (event_id, _, price) in ticket_prices(db).await? {
        let entry = per_event.entry(event_id).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += price;
    }

    let events = Event::find()
        .order_by_asc(event::Column::Id)
        .all(db)
        .await?;

    Ok(events
        .into_iter()
        .map(|event| {
            let (tickets_sold, total_sales) =
                per_event.get(&event.id).copied().unwrap_or_default();
            EventSales {
                event_id: event.id,
                event_title: event.title,
                tickets_sold,
                total_sales,
            }
        })
        .collect())
}

/// Events organized and tickets bought per user.
pub async fn users_report(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<UserActivity>> {
    principal.require_admin()?;

    let mut organized: HashMap<i64, u64> = HashMap::new();
    let organizers: Vec<i64> = Event::find()
        .select_only()
        .column(event::Column::OrganizerId)
        .into_tuple()
        .all(db)
        .await?;
    for organizer_id in organizers {
        *organized.entry(organizer_id).or_default() += 1;
    }

    let mut purchased: HashMap<i64, u64> = HashMap::new();
    for (_, user_id, _) in ticket_prices(db).await? {
        *purchased.entry(user_id).or_default() += 1;
    }

    let users = User::find().order_by_asc(crate::entities::UserColumn::Id).all(db).await?;
    Ok(users
        .into_iter()
        .map(|user| UserActivity {
            events_organized: organized.get(&user.id).copied().unwrap_or(0),
            tickets_purchased: purchased.get(&user.id).copied().unwrap_or(0),
            user_id: user.id,
            user_name: user.user_name,
            email: user.email,
            role: user.role,
        })
        .collect())
}

/// Every event with its organizer and ticket count, soonest first.
pub async fn events_report(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<EventSummary>> {
    principal.require_admin()?;

    let mut sold: HashMap<i64, u64> = HashMap::new();
    for (event_id, _, _) in ticket_prices(db).await? {
        *sold.entry(event_id).or_default() += 1;
    }

    let events = Event::find()
        .order_by_asc(event::Column::EventDate)
        .order_by_asc(event::Column::Id)
        .find_also_related(User)
        .all(db)
        .await?;

    Ok(events
        .into_iter()
        .map(|(event, organizer)| EventSummary {
            tickets_sold: sold.get(&event.id).copied().unwrap_or(0),
            event_id: event.id,
            title: event.title,
            event_date: event.event_date,
            location: event.location,
            organizer_name: organizer.map(|u| u.user_name),
        })
        .collect())
}
