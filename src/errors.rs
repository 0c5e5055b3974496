//! Unified error types and result handling.
//!
//! Every fallible operation in the crate returns [`Result`]. Domain failures carry
//! enough context for the delivery layer to build a user-facing message; storage
//! failures wrap the underlying [`sea_orm::DbErr`].

use crate::core::ticket::TicketDisplay;
use rust_decimal::Decimal;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Discount code is unknown, switched off, or outside its validity window
    #[error("Invalid discount code '{code}': {reason}")]
    InvalidDiscount {
        /// Code as supplied by the customer
        code: String,
        /// Why it was rejected
        reason: String,
    },

    /// Scanned string does not follow the QR payload format
    #[error("Invalid QR code format: {reason}")]
    MalformedPayload {
        /// What part of the payload failed to parse
        reason: String,
    },

    /// Decoded (ticket, event, user) triple matches no stored ticket
    #[error("Ticket not found")]
    TicketNotFound,

    /// Ticket was already scanned; carries the stored ticket for display
    #[error("Ticket {} already used", .ticket.ticket_id)]
    AlreadyRedeemed {
        /// Display metadata of the previously redeemed ticket
        ticket: Box<TicketDisplay>,
    },

    /// Ticket was cancelled and can no longer be redeemed
    #[error("Ticket {ticket_id} has been cancelled")]
    TicketCancelled {
        /// Id of the cancelled ticket
        ticket_id: i64,
    },

    /// Ticket is valid but its event is on a later date
    #[error("Ticket {} is for a future event on {}", .ticket.ticket_id, .ticket.event_date.format("%Y-%m-%d"))]
    EventNotYetStarted {
        /// Display metadata of the ticket that was scanned early
        ticket: Box<TicketDisplay>,
    },

    /// No event with this id
    #[error("Event {event_id} not found")]
    EventNotFound {
        /// Requested event id
        event_id: i64,
    },

    /// Event exists but is not on sale
    #[error("Event {event_id} is not available for purchase")]
    EventUnavailable {
        /// Requested event id
        event_id: i64,
    },

    /// No user with this id
    #[error("User {user_id} not found")]
    UserNotFound {
        /// Requested user id
        user_id: i64,
    },

    /// No discount with this id
    #[error("Discount {discount_id} not found")]
    DiscountNotFound {
        /// Requested discount id
        discount_id: i64,
    },

    /// Loyalty balance is lower than the points a purchase wants to spend
    #[error("Insufficient loyalty points: have {available}, need {required}")]
    InsufficientLoyaltyPoints {
        /// Points currently held
        available: i64,
        /// Points the operation tried to debit
        required: i64,
    },

    /// Purchase has a price and must go through the hosted checkout
    #[error("Payment of {amount} required, use the checkout")]
    PaymentRequired {
        /// Final price still to be charged
        amount: Decimal,
    },

    /// Monetary amount is negative or otherwise unusable
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Input failed validation
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable explanation
        message: String,
    },

    /// Caller lacks the role or ownership required for the operation
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable explanation
        message: String,
    },

    /// Email/password pair did not match a user
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Request carried no usable caller identity
    #[error("Authentication required")]
    Unauthenticated,

    /// Checkout provider callback failed verification
    #[error("Invalid checkout callback: {reason}")]
    InvalidCallback {
        /// Why the callback was rejected
        reason: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable explanation
        message: String,
    },

    /// Underlying store unavailable or write conflict
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::MalformedPayload`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
