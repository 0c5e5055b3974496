//! HTTP delivery layer.
//!
//! A thin axum router over [`crate::core`]. Handlers resolve the caller into a
//! [`Principal`](crate::core::user::Principal), call one core operation and
//! wrap its result in the JSON envelope from [`response`].

pub mod auth;
pub mod error;
pub mod handlers;
pub mod response;

use crate::config::AppConfig;
use crate::core::redemption::ScanPolicy;
use crate::errors::Result;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Connection pool
    pub db: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// How scanned QR strings are authenticated
    pub scan_policy: Arc<ScanPolicy>,
}

impl AppState {
    /// Builds the state, deriving the scan policy from `config.qr`.
    ///
    /// # Errors
    /// Returns [`crate::errors::Error::Config`] for an unusable QR signing setup.
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Result<Self> {
        let scan_policy = ScanPolicy::from_config(&config.qr)?;
        if scan_policy.signer.is_none() {
            warn!("No QR signing secret configured, scannable codes are unsigned");
        }
        Ok(Self {
            db,
            config: Arc::new(config),
            scan_policy: Arc::new(scan_policy),
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let allow_origin = if allowed.is_empty() {
        warn!("CORS: No valid origins configured, allowing any origin");
        AllowOrigin::any()
    } else {
        info!("CORS: Configured with {} allowed origin(s)", allowed.len());
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static(auth::USER_ID_HEADER),
        ])
        .max_age(Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

/// Builds the application router.
pub fn create_routes(state: AppState) -> Router {
    use handlers::{checkout, discounts, events, loyalty, reports, tickets, users};

    let api = Router::new()
        .route("/users", get(users::list).post(users::save))
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/users/:id", get(users::get).delete(users::delete))
        .route("/events", get(events::upcoming).post(events::create))
        .route("/events/search", get(events::search))
        .route("/events/categories", get(events::categories))
        .route("/events/mine", get(events::mine))
        .route(
            "/events/:id",
            get(events::details).put(events::update).delete(events::delete),
        )
        .route("/tickets", get(tickets::list).post(tickets::purchase))
        .route("/tickets/quote", post(tickets::quote))
        .route("/tickets/validate", post(tickets::validate))
        .route("/tickets/:id", get(tickets::details))
        .route("/tickets/:id/cancel", post(tickets::cancel))
        .route("/checkout", post(checkout::begin))
        .route("/checkout/callback", get(checkout::callback))
        .route("/discounts", get(discounts::list).post(discounts::create))
        .route(
            "/discounts/:id",
            get(discounts::get)
                .put(discounts::update)
                .delete(discounts::delete),
        )
        .route("/loyalty", get(loyalty::balance))
        .route("/reports/dashboard", get(reports::dashboard))
        .route("/reports/sales", get(reports::sales))
        .route("/reports/events", get(reports::events))
        .route("/reports/users", get(reports::users));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
