//! Webhook reconciliation: verified payment events drive the order
//! state machine and hand paid orders to the fulfillment worker.

use store::order::{OrderStore, StatusChange, TransitionOutcome};

use crate::error::{PipelineError, Result};
use crate::event::{verify_and_parse, PaymentEvent};
use crate::services::{FulfillmentJob, JobDispatcher};

/// How a webhook delivery was handled. Every variant acknowledges the
/// delivery; the provider must not redeliver any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    /// The event changed order state.
    Processed,
    /// The event had already been applied; nothing changed.
    Duplicate,
    /// The event type is not one we act on, or it references a payment
    /// intent we never issued.
    Ignored,
}

/// Applies verified payment-provider events to the order store.
pub struct WebhookReconciler<O, D> {
    orders: O,
    dispatcher: D,
    secret: String,
}

impl<O, D> WebhookReconciler<O, D>
where
    O: OrderStore,
    D: JobDispatcher,
{
    /// Creates a new reconciler with the shared webhook secret.
    pub fn new(orders: O, dispatcher: D, secret: String) -> Self {
        Self {
            orders,
            dispatcher,
            secret,
        }
    }

    /// Verifies a raw webhook delivery and applies the event it carries.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn handle_delivery(&self, payload: &[u8], signature: &str) -> Result<WebhookAck> {
        let event = verify_and_parse(payload, signature, &self.secret)?;
        self.apply_event(event).await
    }

    async fn apply_event(&self, event: PaymentEvent) -> Result<WebhookAck> {
        match event {
            PaymentEvent::CheckoutSessionCompleted {
                session_ref,
                payment_intent_ref,
                order_id,
            } => {
                let outcome = self
                    .orders
                    .transition(order_id, StatusChange::paid(payment_intent_ref))
                    .await?;
                match outcome {
                    TransitionOutcome::Applied(order) => {
                        tracing::info!(
                            order_id = %order.id,
                            session_ref = %session_ref,
                            "order marked paid, enqueueing fulfillment"
                        );
                        metrics::counter!("webhook_events_total", "outcome" => "processed")
                            .increment(1);
                        self.dispatcher.enqueue(FulfillmentJob { order_id }).await?;
                        Ok(WebhookAck::Processed)
                    }
                    TransitionOutcome::Skipped { current } => {
                        tracing::info!(
                            order_id = %order_id,
                            current = current.as_str(),
                            "duplicate payment confirmation, no-op"
                        );
                        metrics::counter!("webhook_events_total", "outcome" => "duplicate")
                            .increment(1);
                        Ok(WebhookAck::Duplicate)
                    }
                    TransitionOutcome::NotFound => Err(PipelineError::MalformedEvent(format!(
                        "completed session references unknown order {}",
                        order_id
                    ))),
                }
            }
            PaymentEvent::PaymentIntentFailed { payment_intent_ref } => {
                let order = self
                    .orders
                    .find_by_payment_intent(&payment_intent_ref)
                    .await?;
                let Some(order) = order else {
                    tracing::warn!(
                        intent_ref = %payment_intent_ref,
                        "payment failure for unknown intent, ignoring"
                    );
                    metrics::counter!("webhook_events_total", "outcome" => "ignored").increment(1);
                    return Ok(WebhookAck::Ignored);
                };
                let outcome = self
                    .orders
                    .transition(order.id, StatusChange::failed())
                    .await?;
                match outcome {
                    TransitionOutcome::Applied(order) => {
                        tracing::info!(order_id = %order.id, "order marked failed");
                        metrics::counter!("webhook_events_total", "outcome" => "processed")
                            .increment(1);
                        Ok(WebhookAck::Processed)
                    }
                    // A failure event after payment confirmed, or redelivered
                    // after we already marked the order failed.
                    TransitionOutcome::Skipped { current } => {
                        tracing::info!(
                            order_id = %order.id,
                            current = current.as_str(),
                            "payment failure superseded by current status, no-op"
                        );
                        metrics::counter!("webhook_events_total", "outcome" => "duplicate")
                            .increment(1);
                        Ok(WebhookAck::Duplicate)
                    }
                    TransitionOutcome::NotFound => Ok(WebhookAck::Ignored),
                }
            }
            PaymentEvent::Unknown { event_type } => {
                tracing::debug!(event_type = %event_type, "unhandled event type");
                metrics::counter!("webhook_events_total", "outcome" => "ignored").increment(1);
                Ok(WebhookAck::Ignored)
            }
        }
    }
}
