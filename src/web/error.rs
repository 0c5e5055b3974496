//! Mapping of [`Error`] onto HTTP responses.

use crate::errors::Error;
use crate::web::response::error as error_response;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{error, warn};

impl Error {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidDiscount { .. }
            | Self::MalformedPayload { .. }
            | Self::InvalidAmount { .. }
            | Self::Validation { .. }
            | Self::InvalidCallback { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::TicketNotFound
            | Self::EventNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::DiscountNotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyRedeemed { .. }
            | Self::TicketCancelled { .. }
            | Self::EventNotYetStarted { .. }
            | Self::EventUnavailable { .. }
            | Self::InsufficientLoyaltyPoints { .. } => StatusCode::CONFLICT,
            Self::Config { .. } | Self::Database(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidDiscount { .. } => "INVALID_DISCOUNT",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::TicketNotFound => "TICKET_NOT_FOUND",
            Self::AlreadyRedeemed { .. } => "ALREADY_REDEEMED",
            Self::TicketCancelled { .. } => "TICKET_CANCELLED",
            Self::EventNotYetStarted { .. } => "EVENT_NOT_YET_STARTED",
            Self::EventNotFound { .. } => "EVENT_NOT_FOUND",
            Self::EventUnavailable { .. } => "EVENT_UNAVAILABLE",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::DiscountNotFound { .. } => "DISCOUNT_NOT_FOUND",
            Self::InsufficientLoyaltyPoints { .. } => "INSUFFICIENT_LOYALTY_POINTS",
            Self::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Unauthenticated => "AUTH_REQUIRED",
            Self::InvalidCallback { .. } => "INVALID_CALLBACK",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Io(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::AlreadyRedeemed { ticket } | Self::EventNotYetStarted { ticket } => {
                serde_json::to_value(ticket.as_ref()).ok()
            }
            Self::InsufficientLoyaltyPoints {
                available,
                required,
            } => Some(serde_json::json!({ "available": available, "required": required })),
            Self::PaymentRequired { amount } => Some(serde_json::json!({ "amount": amount })),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details are logged, never sent
        let message = if status.is_server_error() {
            error!(error = ?self, "Request failed");
            "An internal error occurred".to_string()
        } else {
            warn!(code = self.code(), "{}", self);
            self.to_string()
        };

        error_response(self.code(), message, self.details(), status)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::ticket::TicketDisplay;
    use crate::entities::TicketStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn display() -> TicketDisplay {
        TicketDisplay {
            ticket_id: 7,
            event_id: 3,
            event_title: "Jazz Night".to_string(),
            event_date: Utc::now(),
            event_location: None,
            holder_name: "Ann".to_string(),
            holder_email: "ann@example.com".to_string(),
            price_paid: dec!(25.00),
            purchase_date: Utc::now(),
            status: TicketStatus::Used,
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::TicketNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::malformed("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::AlreadyRedeemed {
                ticket: Box::new(display())
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Database(sea_orm::DbErr::Custom("boom".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let unpaid = Error::PaymentRequired {
            amount: dec!(12.50),
        };
        assert_eq!(unpaid.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(unpaid.code(), "PAYMENT_REQUIRED");
        assert_eq!(unpaid.details().unwrap()["amount"], "12.50");
    }

    #[test]
    fn test_redemption_errors_carry_ticket() {
        let error = Error::EventNotYetStarted {
            ticket: Box::new(display()),
        };
        let details = error.details().unwrap();
        assert_eq!(details["ticket_id"], 7);
        assert_eq!(details["event_title"], "Jazz Night");
        assert_eq!(details["status"], "Used");

        assert!(Error::TicketNotFound.details().is_none());
    }
}
