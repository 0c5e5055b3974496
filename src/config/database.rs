//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust structs
//! without hand-written SQL. Creation is idempotent and safe to run on every start.

use crate::entities::{Discount, Event, LoyaltyPoint, Payment, Ticket, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::path::Path;
use tracing::{debug, info};

/// Database used when neither the config file nor `DATABASE_URL` names one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/star_events.sqlite?mode=rwc";

/// File path of a `sqlite://` URL, without query string. None for in-memory
/// and non-SQLite URLs.
fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.contains(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Establishes a connection to the database at `database_url`.
///
/// For file databases the parent directory is created first.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_file_path(database_url)
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    debug!("Connecting to database at {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables that do not exist yet.
///
/// Parents are created before children so foreign keys resolve on backends that
/// check them at creation time.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Event).await?;
    create_table(db, &schema, Ticket).await?;
    create_table(db, &schema, Payment).await?;
    create_table(db, &schema, Discount).await?;
    create_table(db, &schema, LoyaltyPoint).await?;

    info!("Database tables ensured");
    Ok(())
}
