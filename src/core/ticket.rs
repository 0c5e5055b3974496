//! Ticket lifecycle - issuance, lookup, cancellation.
//!
//! Tickets come into existence through [`issue_ticket`] (paid, settled by the
//! checkout) or [`claim_free_ticket`]. Both write the ticket, its QR payload,
//! its payment and both loyalty movements inside one database transaction:
//! either all of them are visible afterwards or none are.

use crate::{
    core::{
        loyalty,
        pricing::{self, PriceQuote},
        qr::{PayloadSigner, QrPayload},
        user::Principal,
    },
    entities::{
        Event, EventStatus, Payment, Ticket, TicketStatus, User, event, payment, ticket,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Status recorded on every payment written at issuance.
pub const PAYMENT_COMPLETED: &str = "Completed";

/// Ticket metadata shown to door staff and customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketDisplay {
    /// Ticket id
    pub ticket_id: i64,
    /// Event id
    pub event_id: i64,
    /// Event title
    pub event_title: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Venue, if the organizer gave one
    pub event_location: Option<String>,
    /// Holder's display name
    pub holder_name: String,
    /// Holder's email
    pub holder_email: String,
    /// Amount charged for the ticket
    pub price_paid: Decimal,
    /// When the ticket was bought
    pub purchase_date: DateTime<Utc>,
    /// Status at the time the display was built
    pub status: TicketStatus,
}

/// Purchase request for a single ticket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueTicketRequest {
    /// Event to buy a ticket for
    pub event_id: i64,
    /// Optional discount code; blank counts as none
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Spend loyalty points on this purchase
    #[serde(default)]
    pub use_loyalty: bool,
    /// Label stored on the payment, e.g. "Card"
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Checkout reference the charge was captured under. Set by the checkout
    /// callback only, never read from a request body.
    #[serde(skip)]
    pub provider_reference: Option<String>,
}

/// Everything written by a successful [`issue_ticket`].
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTicket {
    /// The new ticket, QR payload included
    pub ticket: ticket::Model,
    /// Its payment
    pub payment: payment::Model,
    /// Price breakdown the payment was computed from
    pub quote: PriceQuote,
    /// Points added to the buyer's balance for this purchase
    pub points_earned: i64,
    /// Stored QR payload, `STAREVENTS|ticket|event|user`
    pub qr_payload: String,
}

/// A ticket together with its event and payment.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    /// The ticket row
    pub ticket: ticket::Model,
    /// Its event, unless it was deleted
    pub event: Option<event::Model>,
    /// Its payment
    pub payment: Option<payment::Model>,
}

/// Points earned for a purchase: one per whole currency unit actually paid.
#[must_use]
pub fn points_for_purchase(final_price: Decimal) -> i64 {
    final_price.max(Decimal::ZERO).floor().to_i64().unwrap_or(0)
}

/// Buys one ticket for the calling user.
///
/// Steps, all inside one transaction:
/// 1. Load the event; it must exist and be `Active`
/// 2. Make sure the buyer has a loyalty row
/// 3. Price the ticket from the stored event price, the discount code and the
///    buyer's balance
/// 4. Insert the ticket as `Valid` and store its QR payload
/// 5. Insert the `Completed` payment for the final price
/// 6. Debit the consumed points, then credit points for the amount paid
///
/// # Errors
/// Returns an error if:
/// - The event does not exist or is not on sale
/// - The discount code is unknown, inactive or out of its window
/// - The balance changed underneath and no longer covers the points used
/// - Any database write fails
///
/// Nothing is written when an error is returned.
#[instrument(skip(db, request), fields(event_id = request.event_id, user_id = principal.user_id))]
pub async fn issue_ticket(
    db: &DatabaseConnection,
    principal: &Principal,
    request: IssueTicketRequest,
    now: DateTime<Utc>,
) -> Result<IssuedTicket> {
    issue(db, principal, request, None, now).await
}

/// Issues a ticket that costs nothing once discount and loyalty are applied.
///
/// Anything with a price goes through the hosted checkout instead.
///
/// # Errors
/// Returns [`Error::PaymentRequired`] if the final price is above zero, plus
/// every error of [`issue_ticket`]. Nothing is written when an error is returned.
#[instrument(skip(db, request), fields(event_id = request.event_id, user_id = principal.user_id))]
pub async fn claim_free_ticket(
    db: &DatabaseConnection,
    principal: &Principal,
    request: IssueTicketRequest,
    now: DateTime<Utc>,
) -> Result<IssuedTicket> {
    issue(db, principal, request, Some(Decimal::ZERO), now).await
}

async fn issue(
    db: &DatabaseConnection,
    principal: &Principal,
    request: IssueTicketRequest,
    max_charge: Option<Decimal>,
    now: DateTime<Utc>,
) -> Result<IssuedTicket> {
    let txn = db.begin().await?;

    let event = Event::find_by_id(request.event_id)
        .one(&txn)
        .await?
        .ok_or(Error::EventNotFound {
            event_id: request.event_id,
        })?;
    if event.status != EventStatus::Active {
        return Err(Error::EventUnavailable { event_id: event.id });
    }

    let account = loyalty::ensure_account(&txn, principal.user_id, now).await?;
    let discount =
        pricing::resolve_optional_discount(&txn, request.discount_code.as_deref(), now).await?;
    let quote = pricing::compute_price(
        event.ticket_price,
        discount.as_ref(),
        request.use_loyalty,
        account.points,
        now,
    )?;
    if max_charge.is_some_and(|limit| quote.final_price > limit) {
        return Err(Error::PaymentRequired {
            amount: quote.final_price,
        });
    }

    let inserted = ticket::ActiveModel {
        event_id: Set(event.id),
        user_id: Set(principal.user_id),
        purchase_date: Set(now),
        price_paid: Set(quote.final_price),
        status: Set(TicketStatus::Valid),
        qr_code: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    // The payload embeds the ticket id, so it can only be built after the insert
    let qr_payload = QrPayload::new(inserted.id, event.id, principal.user_id).encode();
    let mut with_code: ticket::ActiveModel = inserted.into();
    with_code.qr_code = Set(Some(qr_payload.clone()));
    let ticket = with_code.update(&txn).await?;

    let payment = payment::ActiveModel {
        ticket_id: Set(ticket.id),
        amount: Set(quote.final_price),
        payment_date: Set(now),
        payment_method: Set(request.payment_method.filter(|m| !m.trim().is_empty())),
        status: Set(PAYMENT_COMPLETED.to_string()),
        provider_reference: Set(request.provider_reference),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    if quote.points_used > 0 {
        loyalty::debit_points(&txn, principal.user_id, quote.points_used, now).await?;
    }
    let points_earned = points_for_purchase(quote.final_price);
    loyalty::credit_points(&txn, principal.user_id, points_earned, now).await?;

    txn.commit().await?;

    info!(
        "Issued ticket {} for event {} to user {} at {} ({} points used, {} earned)",
        ticket.id, event.id, principal.user_id, quote.final_price, quote.points_used, points_earned
    );

    Ok(IssuedTicket {
        ticket,
        payment,
        quote,
        points_earned,
        qr_payload,
    })
}

/// Retrieves a ticket by id, returning None if it does not exist.
pub async fn get_ticket_by_id<C>(db: &C, ticket_id: i64) -> Result<Option<ticket::Model>>
where
    C: ConnectionTrait,
{
    Ticket::find_by_id(ticket_id).one(db).await.map_err(Into::into)
}

/// Lists the caller's tickets, newest purchase first.
pub async fn get_tickets_for_user(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<TicketDetails>> {
    let rows = Ticket::find()
        .filter(ticket::Column::UserId.eq(principal.user_id))
        .order_by_desc(ticket::Column::PurchaseDate)
        .order_by_desc(ticket::Column::Id)
        .find_also_related(Event)
        .all(db)
        .await?;

    let ticket_ids: Vec<i64> = rows.iter().map(|(t, _)| t.id).collect();
    let mut payments: HashMap<i64, payment::Model> = Payment::find()
        .filter(payment::Column::TicketId.is_in(ticket_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.ticket_id, p))
        .collect();

    Ok(rows
        .into_iter()
        .map(|(ticket, event)| TicketDetails {
            payment: payments.remove(&ticket.id),
            ticket,
            event,
        })
        .collect())
}

/// Loads one ticket with its event and payment.
///
/// Customers only see their own tickets; Admins see all of them.
///
/// # Errors
/// Returns [`Error::TicketNotFound`] if the ticket does not exist or belongs to
/// someone else.
pub async fn get_ticket_for_user(
    db: &DatabaseConnection,
    principal: &Principal,
    ticket_id: i64,
) -> Result<TicketDetails> {
    let ticket = get_ticket_by_id(db, ticket_id)
        .await?
        .filter(|t| t.user_id == principal.user_id || principal.is_admin())
        .ok_or(Error::TicketNotFound)?;

    let event = Event::find_by_id(ticket.event_id).one(db).await?;
    let payment = Payment::find()
        .filter(payment::Column::TicketId.eq(ticket.id))
        .one(db)
        .await?;

    Ok(TicketDetails {
        ticket,
        event,
        payment,
    })
}

/// Builds the display metadata for a ticket from its event and holder.
pub async fn ticket_display<C>(db: &C, ticket: &ticket::Model) -> Result<TicketDisplay>
where
    C: ConnectionTrait,
{
    let event = Event::find_by_id(ticket.event_id)
        .one(db)
        .await?
        .ok_or(Error::EventNotFound {
            event_id: ticket.event_id,
        })?;
    let holder = User::find_by_id(ticket.user_id)
        .one(db)
        .await?
        .ok_or(Error::UserNotFound {
            user_id: ticket.user_id,
        })?;

    Ok(TicketDisplay {
        ticket_id: ticket.id,
        event_id: event.id,
        event_title: event.title,
        event_date: event.event_date,
        event_location: event.location,
        holder_name: holder.user_name,
        holder_email: holder.email,
        price_paid: ticket.price_paid,
        purchase_date: ticket.purchase_date,
        status: ticket.status,
    })
}

/// Error for a ticket that has already left the `Valid` state.
pub(crate) async fn terminal_state_error<C>(db: &C, ticket: &ticket::Model) -> Result<Error>
where
    C: ConnectionTrait,
{
    Ok(match ticket.status {
        TicketStatus::Cancelled => Error::TicketCancelled {
            ticket_id: ticket.id,
        },
        TicketStatus::Used | TicketStatus::Valid => Error::AlreadyRedeemed {
            ticket: Box::new(ticket_display(db, ticket).await?),
        },
    })
}

/// Cancels a ticket that has not been used.
///
/// Only the holder or an Admin may cancel. The status moves `Valid -> Cancelled`
/// with a conditional update, so a ticket scanned concurrently stays `Used`.
///
/// # Errors
/// Returns an error if:
/// - The ticket does not exist
/// - The caller is neither the holder nor an Admin
/// - The ticket was already used or cancelled
#[instrument(skip(db))]
pub async fn cancel_ticket(
    db: &DatabaseConnection,
    principal: &Principal,
    ticket_id: i64,
) -> Result<ticket::Model> {
    let ticket = get_ticket_by_id(db, ticket_id)
        .await?
        .ok_or(Error::TicketNotFound)?;
    if ticket.user_id != principal.user_id && !principal.is_admin() {
        return Err(Error::forbidden("only the ticket holder can cancel it"));
    }

    let result = Ticket::update_many()
        .col_expr(
            ticket::Column::Status,
            Expr::value(TicketStatus::Cancelled),
        )
        .filter(ticket::Column::Id.eq(ticket_id))
        .filter(ticket::Column::Status.eq(TicketStatus::Valid))
        .exec(db)
        .await?;

    let current = get_ticket_by_id(db, ticket_id)
        .await?
        .ok_or(Error::TicketNotFound)?;

    if result.rows_affected == 0 {
        warn!("Ticket {} not cancelled, status is {:?}", ticket_id, current.status);
        return Err(terminal_state_error(db, &current).await?);
    }

    info!("Cancelled ticket {}", ticket_id);
    Ok(current)
}

/// The string a client renders into the ticket's QR image.
///
/// With a signer this is the signed envelope `payload#mac`, otherwise the bare
/// payload.
pub fn scannable_code(ticket: &ticket::Model, signer: Option<&PayloadSigner>) -> Result<String> {
    let payload = ticket
        .qr_code
        .clone()
        .unwrap_or_else(|| QrPayload::new(ticket.id, ticket.event_id, ticket.user_id).encode());

    match signer {
        Some(signer) => signer.sign(&payload),
        None => Ok(payload),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{LoyaltyPoint, Role};
    use crate::test_utils::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn request(event_id: i64) -> IssueTicketRequest {
        IssueTicketRequest {
            event_id,
            payment_method: Some("Card".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_points_for_purchase() {
        assert_eq!(points_for_purchase(dec!(0)), 0);
        assert_eq!(points_for_purchase(dec!(0.99)), 0);
        assert_eq!(points_for_purchase(dec!(30.00)), 30);
        assert_eq!(points_for_purchase(dec!(89.99)), 89);
    }

    #[tokio::test]
    async fn test_issue_ticket() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(50.00), now).await?;
        let principal = Principal::from_user(&customer);

        let issued = issue_ticket(&db, &principal, request(event.id), now).await?;

        assert_eq!(issued.ticket.status, TicketStatus::Valid);
        assert_eq!(issued.ticket.price_paid, dec!(50.00));
        assert_eq!(issued.payment.amount, dec!(50.00));
        assert_eq!(issued.payment.status, PAYMENT_COMPLETED);
        assert_eq!(issued.payment.payment_method.as_deref(), Some("Card"));
        assert_eq!(
            issued.qr_payload,
            format!("STAREVENTS|{}|{}|{}", issued.ticket.id, event.id, customer.id)
        );
        assert_eq!(issued.ticket.qr_code.as_deref(), Some(issued.qr_payload.as_str()));

        // The stored payload decodes back to the same triple
        let decoded = QrPayload::decode(&issued.qr_payload)?;
        assert_eq!(decoded.ticket_id, issued.ticket.id);

        assert_eq!(issued.points_earned, 50);
        assert_eq!(loyalty::get_balance(&db, customer.id).await?, 50);
        Ok(())
    }

    #[tokio::test]
    async fn test_issue_ticket_with_discount_and_loyalty() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(50.00), now).await?;
        create_test_discount(&db, "SAVE10", 10).await?;
        loyalty::credit_points(&db, customer.id, 2000, now).await?;

        let mut req = request(event.id);
        req.discount_code = Some("SAVE10".to_string());
        req.use_loyalty = true;
        let issued = issue_ticket(&db, &Principal::from_user(&customer), req, now).await?;

        // 50 - 5 discount - 20 loyalty
        assert_eq!(issued.quote.discount_amount, dec!(5.00));
        assert_eq!(issued.quote.points_used, 2000);
        assert_eq!(issued.ticket.price_paid, dec!(25.00));
        assert_eq!(issued.payment.amount, dec!(25.00));
        assert_eq!(loyalty::get_balance(&db, customer.id).await?, 25);
        Ok(())
    }

    #[tokio::test]
    async fn test_issue_ticket_rejects_unavailable_event() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(20.00), now).await?;
        set_event_status(&db, event.id, EventStatus::Cancelled).await?;
        let principal = Principal::from_user(&customer);

        let result = issue_ticket(&db, &principal, request(event.id), now).await;
        assert!(matches!(result, Err(Error::EventUnavailable { .. })));

        let result = issue_ticket(&db, &principal, request(9999), now).await;
        assert!(matches!(
            result,
            Err(Error::EventNotFound { event_id: 9999 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_discount_writes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(20.00), now).await?;

        let mut req = request(event.id);
        req.discount_code = Some("BOGUS".to_string());
        let result = issue_ticket(&db, &Principal::from_user(&customer), req, now).await;

        assert!(matches!(result, Err(Error::InvalidDiscount { .. })));
        assert_eq!(Ticket::find().count(&db).await?, 0);
        assert_eq!(Payment::find().count(&db).await?, 0);
        // The lazily created loyalty row is rolled back too
        assert_eq!(LoyaltyPoint::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_free_ticket() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(20.00), now).await?;
        let principal = Principal::from_user(&customer);
        create_test_discount(&db, "COMP", 100).await?;

        let result = claim_free_ticket(&db, &principal, request(event.id), now).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRequired { amount }) if amount == dec!(20.00)
        ));
        assert_eq!(Ticket::find().count(&db).await?, 0);
        assert_eq!(Payment::find().count(&db).await?, 0);

        let mut comp = request(event.id);
        comp.discount_code = Some("COMP".to_string());
        let issued = claim_free_ticket(&db, &principal, comp, now).await?;
        assert_eq!(issued.ticket.price_paid, Decimal::ZERO);
        assert_eq!(issued.payment.amount, Decimal::ZERO);
        assert!(issued.payment.provider_reference.is_none());
        assert_eq!(issued.points_earned, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_issue_ticket_is_atomic() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(40.00), now).await?;
        loyalty::credit_points(&db, customer.id, 1000, now).await?;

        // Make the payment insert fail after the ticket row was written
        db.execute_unprepared(
            "CREATE TRIGGER payments_offline BEFORE INSERT ON payments \
             BEGIN SELECT RAISE(ABORT, 'payments offline'); END;",
        )
        .await?;

        let mut req = request(event.id);
        req.use_loyalty = true;
        let result = issue_ticket(&db, &Principal::from_user(&customer), req, now).await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(Ticket::find().count(&db).await?, 0);
        assert_eq!(Payment::find().count(&db).await?, 0);
        assert_eq!(loyalty::get_balance(&db, customer.id).await?, 1000);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_tickets_for_user() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(10.00), now).await?;
        let other = create_test_user(&db, "other@example.com", Role::Customer).await?;
        let principal = Principal::from_user(&customer);

        let first = issue_ticket(&db, &principal, request(event.id), now).await?;
        let second =
            issue_ticket(&db, &principal, request(event.id), now + Duration::minutes(1)).await?;
        issue_ticket(&db, &Principal::from_user(&other), request(event.id), now).await?;

        let tickets = get_tickets_for_user(&db, &principal).await?;
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].ticket.id, second.ticket.id);
        assert_eq!(tickets[1].ticket.id, first.ticket.id);
        assert!(tickets.iter().all(|t| t.event.is_some() && t.payment.is_some()));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_ticket_for_user_hides_other_tickets() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(10.00), now).await?;
        let other = create_test_user(&db, "other@example.com", Role::Customer).await?;
        let admin = create_test_user(&db, "admin@example.com", Role::Admin).await?;

        let issued = issue_ticket(&db, &Principal::from_user(&customer), request(event.id), now)
            .await?;

        let details =
            get_ticket_for_user(&db, &Principal::from_user(&customer), issued.ticket.id).await?;
        assert_eq!(details.payment.map(|p| p.id), Some(issued.payment.id));

        let hidden =
            get_ticket_for_user(&db, &Principal::from_user(&other), issued.ticket.id).await;
        assert!(matches!(hidden, Err(Error::TicketNotFound)));

        get_ticket_for_user(&db, &Principal::from_user(&admin), issued.ticket.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_ticket() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(10.00), now).await?;
        let other = create_test_user(&db, "other@example.com", Role::Customer).await?;
        let principal = Principal::from_user(&customer);
        let issued = issue_ticket(&db, &principal, request(event.id), now).await?;

        let denied = cancel_ticket(&db, &Principal::from_user(&other), issued.ticket.id).await;
        assert!(matches!(denied, Err(Error::Forbidden { .. })));

        let cancelled = cancel_ticket(&db, &principal, issued.ticket.id).await?;
        assert_eq!(cancelled.status, TicketStatus::Cancelled);

        let again = cancel_ticket(&db, &principal, issued.ticket.id).await;
        assert!(matches!(again, Err(Error::TicketCancelled { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_used_ticket_cannot_be_cancelled() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(10.00), now).await?;
        let principal = Principal::from_user(&customer);
        let issued = issue_ticket(&db, &principal, request(event.id), now).await?;
        set_ticket_status(&db, issued.ticket.id, TicketStatus::Used).await?;

        let result = cancel_ticket(&db, &principal, issued.ticket.id).await;
        match result {
            Err(Error::AlreadyRedeemed { ticket }) => {
                assert_eq!(ticket.ticket_id, issued.ticket.id);
                assert_eq!(ticket.status, TicketStatus::Used);
            }
            other => panic!("expected AlreadyRedeemed, got {other:?}"),
        }
        let stored = get_ticket_by_id(&db, issued.ticket.id).await?.unwrap();
        assert_eq!(stored.status, TicketStatus::Used);
        Ok(())
    }

    #[tokio::test]
    async fn test_scannable_code() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(10.00), now).await?;
        let issued = issue_ticket(&db, &Principal::from_user(&customer), request(event.id), now)
            .await?;

        assert_eq!(scannable_code(&issued.ticket, None)?, issued.qr_payload);

        let signer = PayloadSigner::new("secret")?;
        let signed = scannable_code(&issued.ticket, Some(&signer))?;
        assert_eq!(signer.verify(&signed)?, issued.qr_payload);
        Ok(())
    }
}
