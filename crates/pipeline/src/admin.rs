//! Admin order surface: manual lookups and overrides, gated by an
//! access policy.

use common::{CustomerId, OrderId};
use domain::{Order, OrderStatus};
use store::order::{AdminPatch, OrderStore};

use crate::error::{PipelineError, Result};
use crate::services::AccessPolicy;

/// A manual order edit. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct AdminOrderPatch {
    pub status: Option<OrderStatus>,
    pub tracking_ref: Option<String>,
}

/// Privileged order operations. Admin writes bypass the automated
/// predecessor guard; they are deliberate operator overrides.
pub struct AdminService<O, P> {
    orders: O,
    policy: P,
}

impl<O, P> AdminService<O, P>
where
    O: OrderStore,
    P: AccessPolicy,
{
    /// Creates a new admin service.
    pub fn new(orders: O, policy: P) -> Self {
        Self { orders, policy }
    }

    fn authorize(&self, caller: &CustomerId) -> Result<()> {
        if !self.policy.is_admin(caller) {
            metrics::counter!("admin_requests_denied_total").increment(1);
            return Err(PipelineError::Forbidden);
        }
        Ok(())
    }

    /// Fetches any order by ID.
    #[tracing::instrument(skip(self), fields(caller = %caller))]
    pub async fn get_order(&self, caller: &CustomerId, id: OrderId) -> Result<Order> {
        self.authorize(caller)?;
        self.orders
            .get(id)
            .await?
            .ok_or(PipelineError::OrderNotFound(id))
    }

    /// Applies a manual override to an order.
    #[tracing::instrument(skip(self, patch), fields(caller = %caller))]
    pub async fn update_order(
        &self,
        caller: &CustomerId,
        id: OrderId,
        patch: AdminOrderPatch,
    ) -> Result<Order> {
        self.authorize(caller)?;
        let updated = self
            .orders
            .admin_update(
                id,
                AdminPatch {
                    status: patch.status,
                    tracking_ref: patch.tracking_ref,
                },
            )
            .await?
            .ok_or(PipelineError::OrderNotFound(id))?;
        tracing::info!(
            order_id = %id,
            status = updated.status.as_str(),
            "admin override applied"
        );
        Ok(updated)
    }

    /// Deletes an order.
    #[tracing::instrument(skip(self), fields(caller = %caller))]
    pub async fn delete_order(&self, caller: &CustomerId, id: OrderId) -> Result<()> {
        self.authorize(caller)?;
        if !self.orders.delete(id).await? {
            return Err(PipelineError::OrderNotFound(id));
        }
        tracing::info!(order_id = %id, "order deleted");
        Ok(())
    }
}
