//! In-memory store implementations for testing and local runs.
//!
//! Each store holds its state behind a single `tokio::sync::RwLock`, so a
//! conditional transition is one critical section — the same atomicity the
//! PostgreSQL implementation gets from a conditional `UPDATE`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{Money, OrderId, ProductId};
use domain::Order;
use tokio::sync::RwLock;

use crate::analytics::{AnalyticsStore, DailySnapshot};
use crate::error::StoreError;
use crate::order::{AdminPatch, OrderStore, StatusChange, TransitionOutcome};
use crate::workflow::{FulfillmentRun, FulfillmentRunStore, RunClaim, RunStatus, StepCursor};
use crate::Result;

#[derive(Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    fail_writes: bool,
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail all writes, simulating a transient
    /// outage the webhook transport should retry through.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every stored order.
    pub async fn all_orders(&self) -> Vec<Order> {
        self.state.read().await.orders.values().cloned().collect()
    }
}

fn check_available(fail: bool) -> Result<()> {
    if fail {
        return Err(StoreError::Unavailable("injected write failure".to_string()));
    }
    Ok(())
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_by_session_ref(&self, session_ref: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.payment_session_ref.as_deref() == Some(session_ref))
            .cloned())
    }

    async fn find_by_payment_intent(&self, intent_ref: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.payment_intent_ref.as_deref() == Some(intent_ref))
            .cloned())
    }

    async fn set_session_ref(&self, id: OrderId, session_ref: &str) -> Result<()> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;

        let taken = state
            .orders
            .values()
            .any(|o| o.id != id && o.payment_session_ref.as_deref() == Some(session_ref));
        if taken {
            return Err(StoreError::Conflict(format!(
                "session ref {session_ref} already belongs to another order"
            )));
        }

        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Conflict(format!("order {id} does not exist")))?;
        if order.payment_session_ref.is_some() {
            return Err(StoreError::Conflict(format!(
                "order {id} already has a session ref"
            )));
        }
        order.payment_session_ref = Some(session_ref.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(&self, id: OrderId, change: StatusChange) -> Result<TransitionOutcome> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;

        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if !order.status.can_transition_to(change.to) {
            return Ok(TransitionOutcome::Skipped {
                current: order.status,
            });
        }

        order.status = change.to;
        if order.payment_intent_ref.is_none() {
            order.payment_intent_ref = change.payment_intent_ref;
        }
        if let Some(tracking) = change.tracking_ref {
            order.tracking_ref = Some(tracking);
        }
        order.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(order.clone()))
    }

    async fn admin_update(&self, id: OrderId, patch: AdminPatch) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;

        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            order.status = status;
        }
        if let Some(tracking) = patch.tracking_ref {
            order.tracking_ref = Some(tracking);
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;
        Ok(state.orders.remove(&id).is_some())
    }

    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.created_at >= from && o.created_at <= to)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[derive(Default)]
struct RunState {
    runs: HashMap<OrderId, FulfillmentRun>,
}

/// In-memory fulfillment-run store.
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    state: Arc<RwLock<RunState>>,
}

impl InMemoryRunStore {
    /// Creates a new empty run store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of run records (one per order ever fulfilled).
    pub async fn run_count(&self) -> usize {
        self.state.read().await.runs.len()
    }

    /// Rewinds a run's `updated_at`, simulating a claim holder that died
    /// mid-run and went quiet.
    pub async fn backdate(&self, order_id: OrderId, by: chrono::Duration) {
        let mut state = self.state.write().await;
        if let Some(run) = state.runs.get_mut(&order_id) {
            run.updated_at -= by;
        }
    }
}

#[async_trait]
impl FulfillmentRunStore for InMemoryRunStore {
    async fn begin(&self, order_id: OrderId, stale_before: DateTime<Utc>) -> Result<RunClaim> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(run) = state.runs.get_mut(&order_id) else {
            let run = FulfillmentRun {
                order_id,
                cursor: StepCursor::Started,
                status: RunStatus::Running,
                deliveries: 1,
                last_error: None,
                started_at: now,
                updated_at: now,
            };
            state.runs.insert(order_id, run.clone());
            return Ok(RunClaim::Claimed(run));
        };

        match run.status {
            RunStatus::Completed => {
                run.deliveries += 1;
                run.updated_at = now;
                Ok(RunClaim::Finished)
            }
            RunStatus::Running if run.updated_at > stale_before => Ok(RunClaim::Busy),
            _ => {
                run.status = RunStatus::Running;
                run.deliveries += 1;
                run.updated_at = now;
                Ok(RunClaim::Claimed(run.clone()))
            }
        }
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<FulfillmentRun>> {
        Ok(self.state.read().await.runs.get(&order_id).cloned())
    }

    async fn advance(&self, order_id: OrderId, cursor: StepCursor) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(run) = state.runs.get_mut(&order_id)
            && cursor > run.cursor
        {
            run.cursor = cursor;
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_completed(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(run) = state.runs.get_mut(&order_id) {
            run.status = RunStatus::Completed;
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, order_id: OrderId, step: &str, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(run) = state.runs.get_mut(&order_id) {
            run.status = RunStatus::Failed;
            run.last_error = Some(format!("{step}: {reason}"));
            run.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
struct AnalyticsState {
    days: HashMap<NaiveDate, DailySnapshot>,
    fail_writes: bool,
}

/// In-memory analytics snapshot store.
#[derive(Clone, Default)]
pub struct InMemoryAnalyticsStore {
    state: Arc<RwLock<AnalyticsState>>,
}

impl InMemoryAnalyticsStore {
    /// Creates a new empty analytics store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail writes, for best-effort caching tests.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }

    /// Returns the number of day rows.
    pub async fn day_count(&self) -> usize {
        self.state.read().await.days.len()
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn record_sale(
        &self,
        day: NaiveDate,
        revenue: Money,
        items: &[(ProductId, u64)],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;

        let snapshot = state
            .days
            .entry(day)
            .or_insert_with(|| DailySnapshot::empty(day));
        snapshot.revenue_cents += revenue.cents();
        snapshot.orders_count += 1;
        for (product_id, units) in items {
            *snapshot
                .units_by_product
                .entry(product_id.clone())
                .or_insert(0) += units;
        }
        Ok(())
    }

    async fn get_day(&self, day: NaiveDate) -> Result<Option<DailySnapshot>> {
        Ok(self.state.read().await.days.get(&day).cloned())
    }

    async fn upsert_day_totals(
        &self,
        day: NaiveDate,
        revenue_cents: i64,
        orders_count: u64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        check_available(state.fail_writes)?;

        let snapshot = state
            .days
            .entry(day)
            .or_insert_with(|| DailySnapshot::empty(day));
        snapshot.revenue_cents = revenue_cents;
        snapshot.orders_count = orders_count;
        Ok(())
    }
}
