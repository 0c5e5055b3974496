//! Caller identity for HTTP requests.
//!
//! Sessions are terminated by the gateway in front of this service, which
//! forwards the authenticated user's id in `X-User-Id`. The role is always read
//! from the users table, never from the request.

use crate::core::user::{self, Principal};
use crate::errors::Error;
use crate::web::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .ok_or(Error::Unauthenticated)?;

        match user::load_principal(&state.db, user_id).await {
            Ok(principal) => Ok(principal),
            Err(Error::UserNotFound { .. }) => {
                debug!("Rejected request for unknown user {}", user_id);
                Err(Error::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }
}
