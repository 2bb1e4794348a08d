//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::Money;

use crate::error::{PipelineError, Result};

/// One display line passed to the hosted checkout page.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

/// A request for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque metadata echoed back in webhook events. The checkout
    /// initiator embeds the order id here.
    pub metadata: HashMap<String, String>,
}

/// Trait for the external payment provider's session API.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout session and returns its reference.
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<String>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<String, SessionRequest>,
    next_id: u32,
    fail_on_create: bool,
    hang_on_create: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the gateway to never answer, for timeout tests.
    pub fn set_hang_on_create(&self, hang: bool) {
        self.state.write().unwrap().hang_on_create = hang;
    }

    /// Returns the number of sessions created.
    pub fn session_count(&self) -> usize {
        self.state.read().unwrap().sessions.len()
    }

    /// Returns the request recorded for a session reference.
    pub fn session(&self, session_ref: &str) -> Option<SessionRequest> {
        self.state.read().unwrap().sessions.get(session_ref).cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<String> {
        let hang = self.state.read().unwrap().hang_on_create;
        if hang {
            // Longer than any sensible session timeout.
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_create {
            return Err(PipelineError::Gateway("provider unavailable".to_string()));
        }

        state.next_id += 1;
        let session_ref = format!("cs_{:04}", state.next_id);
        state.sessions.insert(session_ref.clone(), request);
        Ok(session_ref)
    }
}
