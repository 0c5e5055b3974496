//! Door-side ticket redemption.
//!
//! A scan either moves a ticket from `Valid` to `Used` or explains why it
//! cannot. The transition is a conditional update on `status = 'Valid'`, so of
//! two scanners reading the same code at the same moment exactly one wins and
//! the other gets [`Error::AlreadyRedeemed`].

use crate::{
    config::QrConfig,
    core::{
        qr::{self, PayloadSigner, QrPayload},
        ticket::{TicketDisplay, terminal_state_error, ticket_display},
        user::Principal,
    },
    entities::{Ticket, TicketStatus, ticket},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// How scanned strings are authenticated before they are decoded.
#[derive(Debug, Clone, Default)]
pub struct ScanPolicy {
    /// Verifies `payload#mac` codes when set
    pub signer: Option<PayloadSigner>,
    /// Reject bare payloads without a signature
    pub require_signature: bool,
}

impl ScanPolicy {
    /// Builds the policy from the `[qr]` config section.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if signatures are required but no secret is set,
    /// or the secret is empty.
    pub fn from_config(config: &QrConfig) -> Result<Self> {
        let signer = config
            .signing_secret
            .as_deref()
            .map(PayloadSigner::new)
            .transpose()?;

        if config.require_signature && signer.is_none() {
            return Err(Error::Config {
                message: "qr.require_signature is set but no signing secret is configured"
                    .to_string(),
            });
        }

        Ok(Self {
            signer,
            require_signature: config.require_signature,
        })
    }

    /// Strips and checks the signature envelope, returning the bare payload.
    fn authenticate<'a>(&self, raw: &'a str) -> Result<&'a str> {
        match (&self.signer, qr::is_signed(raw)) {
            (Some(signer), true) => signer.verify(raw),
            (_, false) if self.require_signature => Err(Error::malformed("signature required")),
            // Without a signer a trailing `#mac` fails to decode as a payload
            _ => Ok(raw),
        }
    }
}

/// Successful redemption.
#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    /// The ticket as it is after the scan, status `Used`
    pub ticket: TicketDisplay,
}

/// Validates a scanned QR string and marks the ticket as used.
///
/// Checks, in order:
/// 1. The caller is an Organizer or Admin
/// 2. The signature envelope, per `policy`
/// 3. The payload format
/// 4. A ticket with exactly this (ticket, event, user) triple exists
/// 5. The ticket is still `Valid`
/// 6. The event's calendar date (UTC) is today or earlier
///
/// # Errors
/// Returns [`Error::Forbidden`], [`Error::MalformedPayload`],
/// [`Error::TicketNotFound`], [`Error::AlreadyRedeemed`],
/// [`Error::TicketCancelled`] or [`Error::EventNotYetStarted`]. Only a fully
/// successful scan changes anything.
#[instrument(skip(db, raw, policy), fields(scanner = principal.user_id))]
pub async fn validate_scan(
    db: &DatabaseConnection,
    principal: &Principal,
    raw: &str,
    policy: &ScanPolicy,
    now: DateTime<Utc>,
) -> Result<Redemption> {
    if !principal.can_validate_tickets() {
        return Err(Error::forbidden("only organizers and admins can validate tickets"));
    }

    let payload = QrPayload::decode(policy.authenticate(raw.trim())?)?;

    let ticket = Ticket::find()
        .filter(ticket::Column::Id.eq(payload.ticket_id))
        .filter(ticket::Column::EventId.eq(payload.event_id))
        .filter(ticket::Column::UserId.eq(payload.user_id))
        .one(db)
        .await?
        .ok_or(Error::TicketNotFound)?;

    if ticket.status != TicketStatus::Valid {
        warn!("Rejected scan of ticket {} in state {:?}", ticket.id, ticket.status);
        return Err(terminal_state_error(db, &ticket).await?);
    }

    let display = ticket_display(db, &ticket).await?;
    if display.event_date.date_naive() > now.date_naive() {
        return Err(Error::EventNotYetStarted {
            ticket: Box::new(display),
        });
    }

    let txn = db.begin().await?;
    let result = Ticket::update_many()
        .col_expr(ticket::Column::Status, Expr::value(TicketStatus::Used))
        .filter(ticket::Column::Id.eq(ticket.id))
        .filter(ticket::Column::Status.eq(TicketStatus::Valid))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        // Lost the race against another scan or a cancellation
        let current = Ticket::find_by_id(ticket.id)
            .one(&txn)
            .await?
            .ok_or(Error::TicketNotFound)?;
        let error = terminal_state_error(&txn, &current).await?;
        txn.rollback().await?;
        return Err(error);
    }
    txn.commit().await?;

    info!(
        "Ticket {} for event {} redeemed by user {}",
        ticket.id, ticket.event_id, principal.user_id
    );

    Ok(Redemption {
        ticket: TicketDisplay {
            status: TicketStatus::Used,
            ..display
        },
    })
}
