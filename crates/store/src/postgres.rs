//! PostgreSQL-backed store implementation.
//!
//! Uses the runtime `query`/`bind` API throughout. Status transitions are a
//! single conditional `UPDATE … WHERE status = ANY(predecessors)`, so the
//! redelivery guard holds under concurrent webhook deliveries without any
//! application-side locking.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use domain::{Order, OrderItem, OrderStatus};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::analytics::{AnalyticsStore, DailySnapshot};
use crate::error::StoreError;
use crate::order::{AdminPatch, OrderStore, StatusChange, TransitionOutcome};
use crate::workflow::{FulfillmentRun, FulfillmentRunStore, RunClaim, RunStatus, StepCursor};
use crate::Result;

const ORDER_COLUMNS: &str = "id, customer_id, items, subtotal_cents, shipping_cents, tax_cents, \
     total_cents, status, payment_session_ref, payment_intent_ref, tracking_ref, created_at, updated_at";

/// PostgreSQL implementation of all three store traits.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items_json: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items_json)?;
        let status_str: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_str).ok_or_else(|| {
            StoreError::Conflict(format!("unknown order status in database: {status_str}"))
        })?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            items,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            shipping: Money::from_cents(row.try_get("shipping_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            status,
            payment_session_ref: row.try_get("payment_session_ref")?,
            payment_intent_ref: row.try_get("payment_intent_ref")?,
            tracking_ref: row.try_get("tracking_ref")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_run(row: PgRow) -> Result<FulfillmentRun> {
        let cursor_str: String = row.try_get("cursor")?;
        let status_str: String = row.try_get("status")?;
        let cursor = StepCursor::parse(&cursor_str).ok_or_else(|| {
            StoreError::Conflict(format!("unknown step cursor in database: {cursor_str}"))
        })?;
        let status = RunStatus::parse(&status_str).ok_or_else(|| {
            StoreError::Conflict(format!("unknown run status in database: {status_str}"))
        })?;

        Ok(FulfillmentRun {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            cursor,
            status,
            deliveries: row.try_get::<i32, _>("deliveries")? as u32,
            last_error: row.try_get("last_error")?,
            started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_snapshot(row: PgRow) -> Result<DailySnapshot> {
        let units_json: serde_json::Value = row.try_get("units_by_product")?;
        let units: HashMap<String, u64> = serde_json::from_value(units_json)?;

        Ok(DailySnapshot {
            day: row.try_get::<NaiveDate, _>("day")?,
            revenue_cents: row.try_get("revenue_cents")?,
            orders_count: row.try_get::<i64, _>("orders_count")? as u64,
            units_by_product: units
                .into_iter()
                .map(|(id, n)| (ProductId::new(id), n))
                .collect(),
        })
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let items_json = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, items, subtotal_cents, shipping_cents,
                tax_cents, total_cents, status, payment_session_ref, payment_intent_ref,
                tracking_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(items_json)
        .bind(order.subtotal.cents())
        .bind(order.shipping.cents())
        .bind(order.tax.cents())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(&order.payment_session_ref)
        .bind(&order.payment_intent_ref)
        .bind(&order.tracking_ref)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_session_ref(&self, session_ref: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_session_ref = $1"
        ))
        .bind(session_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_payment_intent(&self, intent_ref: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_ref = $1"
        ))
        .bind(intent_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn set_session_ref(&self, id: OrderId, session_ref: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_session_ref = $2, updated_at = NOW()
            WHERE id = $1 AND payment_session_ref IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(session_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_payment_session_ref_key")
            {
                return StoreError::Conflict(format!(
                    "session ref {session_ref} already belongs to another order"
                ));
            }
            StoreError::Database(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {id} is missing or already has a session ref"
            )));
        }
        Ok(())
    }

    async fn transition(&self, id: OrderId, change: StatusChange) -> Result<TransitionOutcome> {
        let predecessors: Vec<String> = OrderStatus::automated_predecessors(change.to)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $2,
                payment_intent_ref = COALESCE(payment_intent_ref, $3),
                tracking_ref = COALESCE($4, tracking_ref),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(change.to.as_str())
        .bind(&change.payment_intent_ref)
        .bind(&change.tracking_ref)
        .bind(&predecessors)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Applied(Self::row_to_order(row)?));
        }

        // Nothing matched: either the order is gone or its status is not a
        // valid predecessor.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match current {
            Some(status_str) => {
                let current = OrderStatus::parse(&status_str).ok_or_else(|| {
                    StoreError::Conflict(format!("unknown order status in database: {status_str}"))
                })?;
                Ok(TransitionOutcome::Skipped { current })
            }
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    async fn admin_update(&self, id: OrderId, patch: AdminPatch) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = COALESCE($2, status),
                tracking_ref = COALESCE($3, tracking_ref),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.status.map(|s| s.as_str()))
        .bind(&patch.tracking_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE created_at >= $1 AND created_at <= $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl FulfillmentRunStore for PostgresStore {
    async fn begin(&self, order_id: OrderId, stale_before: DateTime<Utc>) -> Result<RunClaim> {
        // The conflict guard keeps a fresh `running` row untouched: no row
        // comes back and the caller learns another delivery holds the run.
        let row = sqlx::query(
            r#"
            INSERT INTO fulfillment_runs (order_id, cursor, status, deliveries, started_at, updated_at)
            VALUES ($1, 'started', 'running', 1, NOW(), NOW())
            ON CONFLICT (order_id) DO UPDATE SET
                status = CASE
                    WHEN fulfillment_runs.status = 'completed' THEN 'completed'
                    ELSE 'running'
                END,
                deliveries = fulfillment_runs.deliveries + 1,
                updated_at = NOW()
            WHERE fulfillment_runs.status <> 'running'
               OR fulfillment_runs.updated_at <= $2
            RETURNING order_id, cursor, status, deliveries, last_error, started_at, updated_at
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(RunClaim::Busy),
            Some(row) => {
                let run = Self::row_to_run(row)?;
                if run.status == RunStatus::Completed {
                    Ok(RunClaim::Finished)
                } else {
                    Ok(RunClaim::Claimed(run))
                }
            }
        }
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<FulfillmentRun>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, cursor, status, deliveries, last_error, started_at, updated_at
            FROM fulfillment_runs WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_run).transpose()
    }

    async fn advance(&self, order_id: OrderId, cursor: StepCursor) -> Result<()> {
        // Cursor ordinals mirror the StepCursor ordering; the guard keeps
        // the cursor from regressing under racing re-executions.
        sqlx::query(
            r#"
            UPDATE fulfillment_runs
            SET cursor = $2, updated_at = NOW()
            WHERE order_id = $1
              AND array_position(ARRAY['started','stock_decremented','analytics_recorded','notified'], cursor)
                < array_position(ARRAY['started','stock_decremented','analytics_recorded','notified'], $2)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(cursor.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(&self, order_id: OrderId) -> Result<()> {
        sqlx::query(
            "UPDATE fulfillment_runs SET status = 'completed', updated_at = NOW() WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, order_id: OrderId, step: &str, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fulfillment_runs
            SET status = 'failed', last_error = $2, updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(format!("{step}: {reason}"))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for PostgresStore {
    async fn record_sale(
        &self,
        day: NaiveDate,
        revenue: Money,
        items: &[(ProductId, u64)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT units_by_product FROM analytics_daily WHERE day = $1 FOR UPDATE",
        )
        .bind(day)
        .fetch_optional(&mut *tx)
        .await?;

        let mut units: HashMap<String, u64> = match &row {
            Some(row) => serde_json::from_value(row.try_get("units_by_product")?)?,
            None => HashMap::new(),
        };
        for (product_id, n) in items {
            *units.entry(product_id.to_string()).or_insert(0) += n;
        }
        let units_json = serde_json::to_value(&units)?;

        if row.is_some() {
            sqlx::query(
                r#"
                UPDATE analytics_daily
                SET revenue_cents = revenue_cents + $2,
                    orders_count = orders_count + 1,
                    units_by_product = $3
                WHERE day = $1
                "#,
            )
            .bind(day)
            .bind(revenue.cents())
            .bind(units_json)
            .execute(&mut *tx)
            .await?;
        } else {
            // Two first touches of the same day can race; the loser hits the
            // primary key and the caller retries.
            sqlx::query(
                r#"
                INSERT INTO analytics_daily (day, revenue_cents, orders_count, units_by_product)
                VALUES ($1, $2, 1, $3)
                "#,
            )
            .bind(day)
            .bind(revenue.cents())
            .bind(units_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_day(&self, day: NaiveDate) -> Result<Option<DailySnapshot>> {
        let row = sqlx::query(
            "SELECT day, revenue_cents, orders_count, units_by_product FROM analytics_daily WHERE day = $1",
        )
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_snapshot).transpose()
    }

    async fn upsert_day_totals(
        &self,
        day: NaiveDate,
        revenue_cents: i64,
        orders_count: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_daily (day, revenue_cents, orders_count, units_by_product)
            VALUES ($1, $2, $3, '{}'::jsonb)
            ON CONFLICT (day) DO UPDATE SET
                revenue_cents = EXCLUDED.revenue_cents,
                orders_count = EXCLUDED.orders_count
            "#,
        )
        .bind(day)
        .bind(revenue_cents)
        .bind(orders_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
