//! Webhook event verification and decoding.
//!
//! Inbound provider events are HMAC-SHA256 signed over the raw payload
//! bytes. Verification happens before any parsing; a payload whose
//! signature does not check out is never looked at. Decoding is a closed
//! tagged union on the declared event type — unknown shapes of a known
//! type are rejected as malformed, unknown types pass through for the
//! caller to acknowledge and ignore.

use std::collections::HashMap;

use common::OrderId;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{PipelineError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded payload signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// A decoded payment-provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The customer completed the hosted checkout session.
    CheckoutSessionCompleted {
        session_ref: String,
        payment_intent_ref: String,
        /// The order id embedded as session metadata at checkout time.
        order_id: OrderId,
    },
    /// The payment attempt failed.
    PaymentIntentFailed { payment_intent_ref: String },
    /// An event type this pipeline does not consume. Acknowledged and
    /// ignored for forward compatibility.
    Unknown { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutCompletedData {
    session_id: String,
    payment_intent: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct PaymentFailedData {
    payment_intent: String,
}

/// Computes the hex-encoded HMAC-SHA256 signature for a payload.
///
/// This is what the provider sends in [`SIGNATURE_HEADER`]; exposed so
/// tests and fakes can produce valid signatures.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the payload signature and decodes the event.
///
/// Fails with [`PipelineError::AuthenticationFailed`] on a signature
/// mismatch (constant-time comparison) and with
/// [`PipelineError::MalformedEvent`] when a known event type is missing
/// required fields — including the embedded order id on completed
/// checkout sessions.
pub fn verify_and_parse(payload: &[u8], signature: &str, secret: &str) -> Result<PaymentEvent> {
    let expected = hex::decode(signature).map_err(|_| PipelineError::AuthenticationFailed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| PipelineError::AuthenticationFailed)?;

    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| PipelineError::MalformedEvent(format!("undecodable payload: {e}")))?;

    match raw.event_type.as_str() {
        "checkout.session.completed" => {
            let data: CheckoutCompletedData = serde_json::from_value(raw.data).map_err(|e| {
                PipelineError::MalformedEvent(format!("bad checkout.session.completed data: {e}"))
            })?;
            let order_id = data
                .metadata
                .get("order_id")
                .ok_or_else(|| {
                    PipelineError::MalformedEvent(
                        "checkout.session.completed without order_id metadata".to_string(),
                    )
                })?
                .parse::<OrderId>()
                .map_err(|e| {
                    PipelineError::MalformedEvent(format!("unparsable order_id metadata: {e}"))
                })?;

            Ok(PaymentEvent::CheckoutSessionCompleted {
                session_ref: data.session_id,
                payment_intent_ref: data.payment_intent,
                order_id,
            })
        }
        "payment_intent.payment_failed" => {
            let data: PaymentFailedData = serde_json::from_value(raw.data).map_err(|e| {
                PipelineError::MalformedEvent(format!(
                    "bad payment_intent.payment_failed data: {e}"
                ))
            })?;
            Ok(PaymentEvent::PaymentIntentFailed {
                payment_intent_ref: data.payment_intent,
            })
        }
        _ => Ok(PaymentEvent::Unknown {
            event_type: raw.event_type,
        }),
    }
}
