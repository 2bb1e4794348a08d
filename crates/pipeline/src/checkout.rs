//! Checkout initiation: price the cart, persist a pending order, and
//! open a hosted payment session.

use std::collections::HashMap;
use std::time::Duration;

use common::CustomerId;
use domain::pricing::price_cart;
use domain::{CartLine, Order};
use store::order::OrderStore;

use crate::error::{PipelineError, Result};
use crate::services::{PaymentGateway, SessionLineItem, SessionRequest};

const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// The outcome of a successful checkout initiation.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub order_id: common::OrderId,
    pub session_ref: String,
}

/// Coordinates cart pricing, order creation, and payment session setup.
pub struct CheckoutService<O, G> {
    orders: O,
    gateway: G,
    success_url: String,
    cancel_url: String,
    session_timeout: Duration,
}

impl<O, G> CheckoutService<O, G>
where
    O: OrderStore,
    G: PaymentGateway,
{
    /// Creates a new checkout service.
    pub fn new(orders: O, gateway: G, success_url: String, cancel_url: String) -> Self {
        Self {
            orders,
            gateway,
            success_url,
            cancel_url,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Overrides the payment session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Prices the cart, persists a pending order, and opens a payment
    /// session keyed back to the order through metadata.
    #[tracing::instrument(skip(self, lines), fields(customer_id = %customer_id))]
    pub async fn create_checkout(
        &self,
        customer_id: CustomerId,
        lines: Vec<CartLine>,
    ) -> Result<CheckoutSession> {
        let pricing = price_cart(&lines)?;
        let items: Vec<_> = lines.into_iter().map(CartLine::into_item).collect();

        let order = Order::new(customer_id, items, pricing, chrono::Utc::now());
        let order_id = order.id;
        self.orders.insert(order.clone()).await?;

        tracing::info!(
            order_id = %order_id,
            total_cents = order.total.cents(),
            "order created, opening payment session"
        );

        let request = SessionRequest {
            line_items: order
                .items
                .iter()
                .map(|item| SessionLineItem {
                    name: item.name.clone(),
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                })
                .collect(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            metadata: HashMap::from([("order_id".to_string(), order_id.to_string())]),
        };

        let session_ref = match tokio::time::timeout(
            self.session_timeout,
            self.gateway.create_checkout_session(request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(order_id = %order_id, "payment session creation timed out");
                metrics::counter!("checkout_session_timeouts_total").increment(1);
                return Err(PipelineError::GatewayTimeout(
                    self.session_timeout.as_millis() as u64,
                ));
            }
        };

        self.orders.set_session_ref(order_id, &session_ref).await?;

        metrics::counter!("checkout_sessions_created_total").increment(1);
        Ok(CheckoutSession {
            order_id,
            session_ref,
        })
    }
}
