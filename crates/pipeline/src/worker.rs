//! Background worker that drains the fulfillment job channel.

use std::sync::Arc;

use store::order::OrderStore;
use store::workflow::FulfillmentRunStore;
use store::AnalyticsStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::services::{Catalog, FulfillmentJob, NotificationSender};
use crate::workflow::FulfillmentRunner;

/// Spawns the worker task that executes fulfillment jobs.
///
/// Retryable failures are redelivered in-process up to `max_deliveries`
/// times per job; anything still failing after that is left to the run
/// record's `failed` status for manual remediation.
pub fn spawn_fulfillment_worker<O, R, C, A, N>(
    runner: Arc<FulfillmentRunner<O, R, C, A, N>>,
    mut jobs: mpsc::UnboundedReceiver<FulfillmentJob>,
    max_deliveries: u32,
) -> JoinHandle<()>
where
    O: OrderStore + 'static,
    R: FulfillmentRunStore + 'static,
    C: Catalog + 'static,
    A: AnalyticsStore + 'static,
    N: NotificationSender + 'static,
{
    tokio::spawn(async move {
        tracing::info!("fulfillment worker started");
        while let Some(job) = jobs.recv().await {
            let order_id = job.order_id;
            for delivery in 1..=max_deliveries {
                match runner.run(order_id).await {
                    Ok(()) => break,
                    Err(e) if e.is_retryable() && delivery < max_deliveries => {
                        tracing::warn!(
                            order_id = %order_id,
                            delivery,
                            error = %e,
                            "fulfillment delivery failed, redelivering"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            order_id = %order_id,
                            delivery,
                            error = %e,
                            "fulfillment job abandoned"
                        );
                        metrics::counter!("fulfillment_jobs_abandoned_total").increment(1);
                        break;
                    }
                }
            }
        }
        tracing::info!("fulfillment worker stopped");
    })
}
