//! QR payload codec.
//!
//! The payload is the literal ASCII string `STAREVENTS|{ticket}|{event}|{user}`.
//! It is what older tickets were printed with, so the format is fixed.
//!
//! The payload itself carries no integrity check. [`PayloadSigner`] wraps it as
//! `payload#hexmac` (HMAC-SHA256) for the code that is actually rendered, so a
//! forged code for an arbitrary triple can be rejected before any lookup. The
//! stored `Ticket.qr_code` keeps the bare payload.

use crate::errors::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Leading tag of every payload.
pub const PAYLOAD_TAG: &str = "STAREVENTS";
/// Separator between payload fields.
pub const FIELD_SEPARATOR: char = '|';
/// Separator between payload and signature in a signed code.
pub const SIGNATURE_SEPARATOR: char = '#';

type HmacSha256 = Hmac<Sha256>;

/// Identity triple carried by a ticket's QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QrPayload {
    /// Ticket id, assigned when the ticket row is inserted
    pub ticket_id: i64,
    /// Event the ticket admits to
    pub event_id: i64,
    /// Ticket holder
    pub user_id: i64,
}

impl QrPayload {
    /// Creates a payload for the given identifiers.
    #[must_use]
    pub const fn new(ticket_id: i64, event_id: i64, user_id: i64) -> Self {
        Self {
            ticket_id,
            event_id,
            user_id,
        }
    }

    /// Encodes the payload as `STAREVENTS|ticket|event|user`.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes a payload string.
    ///
    /// # Errors
    /// Returns [`Error::MalformedPayload`] unless the input has exactly four
    /// `|`-separated parts, the first is `STAREVENTS`, and the rest are
    /// non-negative integers.
    pub fn decode(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
        let [tag, ticket, event, user] = parts.as_slice() else {
            return Err(Error::malformed(format!(
                "expected 4 fields, found {}",
                parts.len()
            )));
        };

        if *tag != PAYLOAD_TAG {
            return Err(Error::malformed("unknown tag"));
        }

        Ok(Self {
            ticket_id: parse_id(ticket, "ticket id")?,
            event_id: parse_id(event, "event id")?,
            user_id: parse_id(user, "user id")?,
        })
    }
}

fn parse_id(field: &str, name: &str) -> Result<i64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(format!("{name} is not a number")));
    }
    field
        .parse::<i64>()
        .map_err(|_| Error::malformed(format!("{name} is out of range")))
}

impl fmt::Display for QrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PAYLOAD_TAG}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.ticket_id, self.event_id, self.user_id
        )
    }
}

impl FromStr for QrPayload {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Signs and verifies scannable codes with a server-side secret.
#[derive(Clone)]
pub struct PayloadSigner {
    secret: Vec<u8>,
}

impl fmt::Debug for PayloadSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadSigner").finish_non_exhaustive()
    }
}

impl PayloadSigner {
    /// Creates a signer from a secret.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(Error::Config {
                message: "QR signing secret cannot be empty".to_string(),
            });
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| Error::Config {
            message: format!("invalid QR signing secret: {e}"),
        })?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Returns `payload#hexmac`.
    pub fn sign(&self, payload: &str) -> Result<String> {
        let tag = hex::encode(self.mac(payload)?.finalize().into_bytes());
        Ok(format!("{payload}{SIGNATURE_SEPARATOR}{tag}"))
    }

    /// Checks a signed code and returns the payload part.
    ///
    /// # Errors
    /// Returns [`Error::MalformedPayload`] if the signature is missing, not hex,
    /// or does not match.
    pub fn verify<'a>(&self, signed: &'a str) -> Result<&'a str> {
        let (payload, tag) = signed
            .rsplit_once(SIGNATURE_SEPARATOR)
            .ok_or_else(|| Error::malformed("missing signature"))?;
        let provided =
            hex::decode(tag).map_err(|_| Error::malformed("signature is not hex encoded"))?;
        let expected = self.mac(payload)?.finalize().into_bytes();

        if provided.len() == expected.len() && bool::from(provided.ct_eq(expected.as_slice())) {
            Ok(payload)
        } else {
            Err(Error::malformed("signature mismatch"))
        }
    }
}

/// Whether a scanned string carries a signature envelope.
#[must_use]
pub fn is_signed(raw: &str) -> bool {
    raw.contains(SIGNATURE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_encode_format() {
        assert_eq!(QrPayload::new(12, 3, 45).encode(), "STAREVENTS|12|3|45");
    }

    #[test]
    fn test_decode_round_trip() -> Result<()> {
        for (t, e, u) in [(0, 0, 0), (1, 2, 3), (987_654, 1, 42), (i64::MAX, 7, i64::MAX)] {
            let payload = QrPayload::new(t, e, u);
            assert_eq!(QrPayload::decode(&payload.encode())?, payload);
        }
        Ok(())
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let bad = [
            "",
            "STAREVENTS",
            "STAREVENTS|1|2",
            "STAREVENTS|1|2|3|4",
            "STARTICKETS|1|2|3",
            "starevents|1|2|3",
            "STAREVENTS|a|2|3",
            "STAREVENTS|1|two|3",
            "STAREVENTS|1|2|",
            "STAREVENTS|-1|2|3",
            "STAREVENTS|1.5|2|3",
            "STAREVENTS| 1|2|3",
            "STAREVENTS|99999999999999999999|2|3",
        ];
        for raw in bad {
            assert!(
                matches!(QrPayload::decode(raw), Err(Error::MalformedPayload { .. })),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_str() {
        let payload: QrPayload = "STAREVENTS|5|6|7".parse().unwrap();
        assert_eq!(payload, QrPayload::new(5, 6, 7));
    }

    #[test]
    fn test_sign_and_verify() -> Result<()> {
        let signer = PayloadSigner::new("door-secret")?;
        let payload = QrPayload::new(1, 2, 3).encode();

        let signed = signer.sign(&payload)?;
        assert!(is_signed(&signed));
        assert!(signed.starts_with("STAREVENTS|1|2|3#"));
        assert_eq!(signer.verify(&signed)?, payload);
        Ok(())
    }

    #[test]
    fn test_verify_rejects_tampering() -> Result<()> {
        let signer = PayloadSigner::new("door-secret")?;
        let signed = signer.sign("STAREVENTS|1|2|3")?;
        let (_, tag) = signed.rsplit_once('#').unwrap();

        // Same signature, different triple
        let forged = format!("STAREVENTS|1|2|4#{tag}");
        assert!(matches!(
            signer.verify(&forged),
            Err(Error::MalformedPayload { .. })
        ));

        // Signed with a different secret
        let other = PayloadSigner::new("other-secret")?;
        assert!(other.verify(&signed).is_err());

        assert!(signer.verify("STAREVENTS|1|2|3").is_err());
        assert!(signer.verify("STAREVENTS|1|2|3#zz").is_err());
        Ok(())
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            PayloadSigner::new(""),
            Err(Error::Config { .. })
        ));
    }
}
