//! Customer notification trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CustomerId;

use crate::error::{PipelineError, Result};

/// A notification recorded by the in-memory sender.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub template: String,
    pub recipient: CustomerId,
    pub data: serde_json::Value,
}

/// Trait for sending templated customer notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends a notification rendered from a template.
    async fn send(
        &self,
        template: &str,
        recipient: &CustomerId,
        data: serde_json::Value,
    ) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemorySenderState {
    sent: Vec<SentNotification>,
    fail_on_send: bool,
}

/// In-memory notification sender for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    state: Arc<RwLock<InMemorySenderState>>,
}

impl InMemoryNotificationSender {
    /// Creates a new in-memory sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of notifications sent.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the notifications sent to a recipient.
    pub fn sent_to(&self, recipient: &CustomerId) -> Vec<SentNotification> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|n| &n.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Configures the sender to fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn send(
        &self,
        template: &str,
        recipient: &CustomerId,
        data: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(PipelineError::Notification(
                "mail backend unavailable".to_string(),
            ));
        }
        state.sent.push(SentNotification {
            template: template.to_string(),
            recipient: recipient.clone(),
            data,
        });
        Ok(())
    }
}
