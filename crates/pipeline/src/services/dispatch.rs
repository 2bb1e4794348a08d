//! Fulfillment job dispatch trait and implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{PipelineError, Result};

/// A unit of background work: fulfill one paid order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentJob {
    pub order_id: OrderId,
}

/// Trait for handing fulfillment work to a background worker.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Enqueues a job for asynchronous processing.
    async fn enqueue(&self, job: FulfillmentJob) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryDispatcherState {
    jobs: Vec<FulfillmentJob>,
    fail_on_enqueue: bool,
}

/// In-memory dispatcher that records jobs for assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobDispatcher {
    state: Arc<RwLock<InMemoryDispatcherState>>,
}

impl InMemoryJobDispatcher {
    /// Creates a new in-memory dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of jobs enqueued.
    pub fn job_count(&self) -> usize {
        self.state.read().unwrap().jobs.len()
    }

    /// Returns the jobs enqueued for an order.
    pub fn jobs_for(&self, order_id: OrderId) -> Vec<FulfillmentJob> {
        self.state
            .read()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Configures the dispatcher to fail enqueues.
    pub fn set_fail_on_enqueue(&self, fail: bool) {
        self.state.write().unwrap().fail_on_enqueue = fail;
    }
}

#[async_trait]
impl JobDispatcher for InMemoryJobDispatcher {
    async fn enqueue(&self, job: FulfillmentJob) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_enqueue {
            return Err(PipelineError::Dispatch("queue unavailable".to_string()));
        }
        state.jobs.push(job);
        Ok(())
    }
}

/// Dispatcher backed by an unbounded channel feeding the worker task.
#[derive(Debug, Clone)]
pub struct ChannelJobDispatcher {
    sender: mpsc::UnboundedSender<FulfillmentJob>,
}

impl ChannelJobDispatcher {
    /// Creates a dispatcher that sends into the given channel.
    pub fn new(sender: mpsc::UnboundedSender<FulfillmentJob>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl JobDispatcher for ChannelJobDispatcher {
    async fn enqueue(&self, job: FulfillmentJob) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|e| PipelineError::Dispatch(format!("worker channel closed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_enqueued_jobs() {
        let dispatcher = InMemoryJobDispatcher::new();
        let order_id = OrderId::new();
        dispatcher.enqueue(FulfillmentJob { order_id }).await.unwrap();
        assert_eq!(dispatcher.job_count(), 1);
        assert_eq!(dispatcher.jobs_for(order_id).len(), 1);
    }

    #[tokio::test]
    async fn channel_dispatcher_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = ChannelJobDispatcher::new(tx);
        let order_id = OrderId::new();
        dispatcher.enqueue(FulfillmentJob { order_id }).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.order_id, order_id);
    }

    #[tokio::test]
    async fn channel_dispatcher_fails_when_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let dispatcher = ChannelJobDispatcher::new(tx);
        let result = dispatcher
            .enqueue(FulfillmentJob {
                order_id: OrderId::new(),
            })
            .await;
        assert!(matches!(result, Err(PipelineError::Dispatch(_))));
    }
}
