//! Hosted checkout hand-off.
//!
//! Card details never reach this service. [`begin_checkout`] prices the
//! purchase and sends the customer to the provider's page with a signed intent;
//! the provider redirects back with the intent, a status and its own signature
//! over both. [`complete_checkout`] checks that signature and only then issues
//! the ticket.
//!
//! Both signatures are HMAC-SHA256 with the shared `checkout.secret`, hex
//! encoded, over the canonical string built by [`CheckoutIntent::canonical`].

use crate::{
    config::CheckoutConfig,
    core::{
        pricing::{self, PriceQuote},
        ticket::{self, IssueTicketRequest, IssuedTicket},
        user::{self, Principal},
    },
    entities::{Payment, payment},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, SqlErr};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// How long a customer has to finish paying.
pub const CHECKOUT_TTL_MINUTES: i64 = 30;

/// Status the provider reports for a captured payment.
pub const STATUS_PAID: &str = "paid";

/// What the customer agreed to buy, echoed back by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutIntent {
    /// Random id correlating the redirect with its callback
    pub reference: String,
    /// Event being bought
    pub event_id: i64,
    /// Buyer
    pub user_id: i64,
    /// Amount the provider charges
    pub amount: Decimal,
    /// Discount code the quote was computed with
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Whether the quote spends loyalty points
    #[serde(default)]
    pub use_loyalty: bool,
    /// Unix timestamp after which the callback is refused
    pub expires_at: i64,
}

impl CheckoutIntent {
    /// Pipe-joined fields in a fixed order; the signed message.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.reference,
            self.event_id,
            self.user_id,
            self.amount.normalize(),
            self.discount_code.as_deref().unwrap_or(""),
            self.use_loyalty,
            self.expires_at
        )
    }
}

/// Where to send the customer, and what they will pay.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    /// Provider page with the signed intent in the query string
    pub redirect_url: String,
    /// The signed intent carried in the URL
    pub intent: CheckoutIntent,
    /// Price breakdown behind `intent.amount`
    pub quote: PriceQuote,
}

/// Query parameters of the provider's redirect back to `return_url`.
///
/// The intent fields are repeated flat rather than nested: query strings carry
/// every value as text.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutCallback {
    /// Echo of [`CheckoutIntent::reference`]
    pub reference: String,
    /// Echo of [`CheckoutIntent::event_id`]
    pub event_id: i64,
    /// Echo of [`CheckoutIntent::user_id`]
    pub user_id: i64,
    /// Amount actually captured
    pub amount: Decimal,
    /// Echo of [`CheckoutIntent::discount_code`]
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Echo of [`CheckoutIntent::use_loyalty`]
    #[serde(default)]
    pub use_loyalty: bool,
    /// Echo of [`CheckoutIntent::expires_at`]
    pub expires_at: i64,
    /// Provider payment status, `paid` on success
    pub status: String,
    /// Provider signature over `canonical|status`
    pub signature: String,
}

impl CheckoutCallback {
    /// The intent the provider echoed back.
    #[must_use]
    pub fn intent(&self) -> CheckoutIntent {
        CheckoutIntent {
            reference: self.reference.clone(),
            event_id: self.event_id,
            user_id: self.user_id,
            amount: self.amount,
            discount_code: self.discount_code.clone(),
            use_loyalty: self.use_loyalty,
            expires_at: self.expires_at,
        }
    }
}

fn mac(secret: &str, message: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::Config {
        message: format!("invalid checkout secret: {e}"),
    })?;
    mac.update(message.as_bytes());
    Ok(mac)
}

/// Hex HMAC of `message` under `secret`.
pub fn sign(secret: &str, message: &str) -> Result<String> {
    Ok(hex::encode(mac(secret, message)?.finalize().into_bytes()))
}

fn verify(secret: &str, message: &str, signature: &str) -> Result<()> {
    let provided = hex::decode(signature).map_err(|_| Error::InvalidCallback {
        reason: "signature is not hex encoded".to_string(),
    })?;
    mac(secret, message)?
        .verify_slice(&provided)
        .map_err(|_| Error::InvalidCallback {
            reason: "signature mismatch".to_string(),
        })
}

/// Message the provider signs on the way back.
#[must_use]
pub fn callback_message(intent: &CheckoutIntent, status: &str) -> String {
    format!("{}|{status}", intent.canonical())
}

/// Prices a purchase and builds the provider redirect.
///
/// Nothing is written; the ticket only exists once the callback arrives.
#[instrument(skip(db, config, discount_code))]
pub async fn begin_checkout(
    db: &DatabaseConnection,
    config: &CheckoutConfig,
    principal: &Principal,
    event_id: i64,
    discount_code: Option<String>,
    use_loyalty: bool,
    now: DateTime<Utc>,
) -> Result<CheckoutSession> {
    let discount_code = discount_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let quote = pricing::quote(
        db,
        principal,
        event_id,
        discount_code.as_deref(),
        use_loyalty,
        now,
    )
    .await?;

    let intent = CheckoutIntent {
        reference: Uuid::new_v4().to_string(),
        event_id,
        user_id: principal.user_id,
        amount: quote.final_price,
        discount_code,
        use_loyalty,
        expires_at: (now + Duration::minutes(CHECKOUT_TTL_MINUTES)).timestamp(),
    };
    let signature = sign(&config.secret, &intent.canonical())?;

    let amount = intent.amount.to_string();
    let event_id = intent.event_id.to_string();
    let user_id = intent.user_id.to_string();
    let use_loyalty = intent.use_loyalty.to_string();
    let expires_at = intent.expires_at.to_string();
    let mut params = vec![
        ("reference", intent.reference.as_str()),
        ("event_id", event_id.as_str()),
        ("user_id", user_id.as_str()),
        ("amount", amount.as_str()),
        ("use_loyalty", use_loyalty.as_str()),
        ("expires_at", expires_at.as_str()),
        ("return_url", config.return_url.as_str()),
        ("signature", signature.as_str()),
    ];
    if let Some(code) = intent.discount_code.as_deref() {
        params.push(("discount_code", code));
    }

    let query = serde_urlencoded::to_string(&params).map_err(|e| Error::Config {
        message: format!("Failed to build checkout URL: {e}"),
    })?;
    let redirect_url = format!("{}?{query}", config.provider_url);

    info!(
        "Checkout {} started for event {} at {}",
        intent.reference, event_id, intent.amount
    );
    Ok(CheckoutSession {
        redirect_url,
        intent,
        quote,
    })
}

fn already_completed(reference: &str) -> Error {
    warn!("Checkout {} already completed, callback replayed", reference);
    Error::InvalidCallback {
        reason: "checkout already completed".to_string(),
    }
}

/// Verifies the provider callback and issues the ticket.
///
/// Each checkout reference settles at most one ticket. The reference is stored
/// on the payment under a unique constraint, so a replayed callback fails even
/// when two copies race.
///
/// # Errors
/// Returns [`Error::InvalidCallback`] if the signature does not verify, the
/// payment is not `paid`, the reference was already used, the intent expired,
/// or the price changed since the checkout started. Issuance errors are passed
/// through.
#[instrument(skip(db, config, callback), fields(reference = %callback.reference))]
pub async fn complete_checkout(
    db: &DatabaseConnection,
    config: &CheckoutConfig,
    callback: CheckoutCallback,
    now: DateTime<Utc>,
) -> Result<IssuedTicket> {
    let intent = callback.intent();
    verify(
        &config.secret,
        &callback_message(&intent, &callback.status),
        &callback.signature,
    )?;

    if callback.status != STATUS_PAID {
        warn!("Checkout {} reported status {}", intent.reference, callback.status);
        return Err(Error::InvalidCallback {
            reason: format!("payment status is '{}'", callback.status),
        });
    }
    let settled = Payment::find()
        .filter(payment::Column::ProviderReference.eq(intent.reference.as_str()))
        .one(db)
        .await?;
    if settled.is_some() {
        return Err(already_completed(&intent.reference));
    }
    if now.timestamp() > intent.expires_at {
        return Err(Error::InvalidCallback {
            reason: "checkout session expired".to_string(),
        });
    }

    let principal = user::load_principal(db, intent.user_id).await?;
    let current = pricing::quote(
        db,
        &principal,
        intent.event_id,
        intent.discount_code.as_deref(),
        intent.use_loyalty,
        now,
    )
    .await?;
    if current.final_price != intent.amount {
        return Err(Error::InvalidCallback {
            reason: format!(
                "price changed from {} to {}",
                intent.amount, current.final_price
            ),
        });
    }

    let result = ticket::issue_ticket(
        db,
        &principal,
        IssueTicketRequest {
            event_id: intent.event_id,
            discount_code: intent.discount_code,
            use_loyalty: intent.use_loyalty,
            payment_method: Some(config.payment_method.clone()),
            provider_reference: Some(intent.reference.clone()),
        },
        now,
    )
    .await;

    match result {
        Err(Error::Database(err))
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
        {
            Err(already_completed(&intent.reference))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::loyalty;
    use crate::entities::{Role, Ticket, TicketStatus};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;
    use sea_orm::{EntityTrait, PaginatorTrait};

    fn config() -> CheckoutConfig {
        CheckoutConfig {
            secret: "provider-secret".to_string(),
            ..Default::default()
        }
    }

    /// Plays the provider: signs the intent it was given with `status`.
    fn provider_callback(intent: &CheckoutIntent, status: &str) -> CheckoutCallback {
        CheckoutCallback {
            reference: intent.reference.clone(),
            event_id: intent.event_id,
            user_id: intent.user_id,
            amount: intent.amount,
            discount_code: intent.discount_code.clone(),
            use_loyalty: intent.use_loyalty,
            expires_at: intent.expires_at,
            status: status.to_string(),
            signature: sign("provider-secret", &callback_message(intent, status)).unwrap(),
        }
    }

    async fn start(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<(Principal, CheckoutSession)> {
        let (customer, event) = customer_and_event(db, dec!(50.00), now).await?;
        create_test_discount(db, "SAVE10", 10).await?;
        let principal = Principal::from_user(&customer);
        let session = begin_checkout(
            db,
            &config(),
            &principal,
            event.id,
            Some(" SAVE10 ".to_string()),
            false,
            now,
        )
        .await?;
        Ok((principal, session))
    }

    #[tokio::test]
    async fn test_begin_checkout_builds_signed_redirect() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (principal, session) = start(&db, now).await?;

        assert_eq!(session.quote.final_price, dec!(45.00));
        assert_eq!(session.intent.amount, dec!(45.00));
        assert_eq!(session.intent.user_id, principal.user_id);
        assert_eq!(session.intent.discount_code.as_deref(), Some("SAVE10"));
        assert!(session.redirect_url.starts_with("https://checkout.example.com/pay?"));
        assert!(session.redirect_url.contains("discount_code=SAVE10"));
        assert!(session.redirect_url.contains("return_url=http%3A%2F%2Flocalhost"));

        let expected = sign("provider-secret", &session.intent.canonical())?;
        assert!(session.redirect_url.contains(&format!("signature={expected}")));

        // Nothing is written until the provider calls back
        assert_eq!(Ticket::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_checkout_issues_ticket() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (principal, session) = start(&db, now).await?;

        let issued =
            complete_checkout(&db, &config(), provider_callback(&session.intent, STATUS_PAID), now)
                .await?;
        assert_eq!(issued.ticket.user_id, principal.user_id);
        assert_eq!(issued.ticket.status, TicketStatus::Valid);
        assert_eq!(issued.payment.amount, dec!(45.00));
        assert_eq!(issued.payment.payment_method.as_deref(), Some("Card"));
        assert_eq!(loyalty::get_balance(&db, principal.user_id).await?, 45);
        Ok(())
    }

    #[tokio::test]
    async fn test_replayed_callback_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (principal, session) = start(&db, now).await?;
        let callback = provider_callback(&session.intent, STATUS_PAID);

        let issued = complete_checkout(&db, &config(), callback.clone(), now).await?;
        assert_eq!(
            issued.payment.provider_reference.as_deref(),
            Some(session.intent.reference.as_str())
        );

        let replay = complete_checkout(&db, &config(), callback, now + Duration::minutes(5)).await;
        assert!(matches!(replay, Err(Error::InvalidCallback { .. })));

        assert_eq!(Ticket::find().count(&db).await?, 1);
        assert_eq!(Payment::find().count(&db).await?, 1);
        assert_eq!(loyalty::get_balance(&db, principal.user_id).await?, 45);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_issue_one_ticket() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (_, session) = start(&db, now).await?;
        let callback = provider_callback(&session.intent, STATUS_PAID);

        let (config_a, config_b) = (config(), config());
        let (first, second) = tokio::join!(
            complete_checkout(&db, &config_a, callback.clone(), now),
            complete_checkout(&db, &config_b, callback.clone(), now),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(Error::InvalidCallback { .. })))
        );
        assert_eq!(Ticket::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_forged_callback_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (_, session) = start(&db, now).await?;

        let mut cheaper = provider_callback(&session.intent, STATUS_PAID);
        cheaper.amount = dec!(1.00);
        let result = complete_checkout(&db, &config(), cheaper, now).await;
        assert!(matches!(result, Err(Error::InvalidCallback { .. })));

        let mut garbage = provider_callback(&session.intent, STATUS_PAID);
        garbage.signature = "not-hex".to_string();
        let result = complete_checkout(&db, &config(), garbage, now).await;
        assert!(matches!(result, Err(Error::InvalidCallback { .. })));

        assert_eq!(Ticket::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unpaid_or_expired_callback_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (_, session) = start(&db, now).await?;

        let declined = provider_callback(&session.intent, "declined");
        let result = complete_checkout(&db, &config(), declined, now).await;
        assert!(matches!(result, Err(Error::InvalidCallback { .. })));

        let late = now + Duration::minutes(CHECKOUT_TTL_MINUTES + 1);
        let result = complete_checkout(
            &db,
            &config(),
            provider_callback(&session.intent, STATUS_PAID),
            late,
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidCallback { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_price_change_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();
        let (customer, event) = customer_and_event(&db, dec!(50.00), now).await?;
        loyalty::credit_points(&db, customer.id, 1000, now).await?;
        let principal = Principal::from_user(&customer);

        let session =
            begin_checkout(&db, &config(), &principal, event.id, None, true, now).await?;
        assert_eq!(session.intent.amount, dec!(40.00));

        // Points spent elsewhere before the callback arrives
        loyalty::debit_points(&db, customer.id, 500, now).await?;

        let result = complete_checkout(
            &db,
            &config(),
            provider_callback(&session.intent, STATUS_PAID),
            now,
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidCallback { .. })));
        assert_eq!(Ticket::find().count(&db).await?, 0);
        Ok(())
    }

    #[test]
    fn test_canonical_ignores_amount_scale() {
        let intent = CheckoutIntent {
            reference: "ref".to_string(),
            event_id: 1,
            user_id: 2,
            amount: dec!(45.00),
            discount_code: None,
            use_loyalty: false,
            expires_at: 100,
        };
        let rescaled = CheckoutIntent {
            amount: dec!(45),
            ..intent.clone()
        };
        assert_eq!(intent.canonical(), "ref|1|2|45||false|100");
        assert_eq!(intent.canonical(), rescaled.canonical());
    }
}
