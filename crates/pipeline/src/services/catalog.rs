//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId};

use crate::error::{PipelineError, Result};

/// A catalog product with its current stock level.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub stock: i64,
}

/// Trait for product lookups and stock adjustments.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the products matching the given ids. Unknown ids are
    /// simply absent from the result.
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Decrements the stock of a product by a quantity. Stock may go
    /// negative; oversell is surfaced through reporting, not blocked here.
    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<()>;

    /// Returns every product in the catalog.
    async fn all_products(&self) -> Result<Vec<Product>>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, Product>,
    fail_on_decrement: bool,
    yield_on_decrement: bool,
    decrement_count: u32,
}

/// In-memory catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates a new in-memory catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn put_product(&self, product: Product) {
        let mut state = self.state.write().unwrap();
        state.products.insert(product.id.clone(), product);
    }

    /// Returns the current stock of a product.
    pub fn stock(&self, id: &ProductId) -> Option<i64> {
        self.state.read().unwrap().products.get(id).map(|p| p.stock)
    }

    /// Configures the catalog to fail stock decrements.
    pub fn set_fail_on_decrement(&self, fail: bool) {
        self.state.write().unwrap().fail_on_decrement = fail;
    }

    /// Makes decrements yield to the scheduler before touching stock,
    /// letting tests interleave a concurrent caller mid-step.
    pub fn set_yield_on_decrement(&self, yield_first: bool) {
        self.state.write().unwrap().yield_on_decrement = yield_first;
    }

    /// Returns the number of successful decrements.
    pub fn decrement_count(&self) -> u32 {
        self.state.read().unwrap().decrement_count
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<()> {
        if self.state.read().unwrap().yield_on_decrement {
            tokio::task::yield_now().await;
        }
        let mut state = self.state.write().unwrap();
        if state.fail_on_decrement {
            return Err(PipelineError::Catalog("stock backend unavailable".to_string()));
        }
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| PipelineError::Catalog(format!("unknown product: {}", id.as_str())))?;
        product.stock -= i64::from(quantity);
        state.decrement_count += 1;
        Ok(())
    }

    async fn all_products(&self) -> Result<Vec<Product>> {
        let state = self.state.read().unwrap();
        Ok(state.products.values().cloned().collect())
    }
}
