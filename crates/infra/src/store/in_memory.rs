use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bakehouse_catalog::Product;
use bakehouse_core::{CustomerId, OrderId, ProductId};
use bakehouse_orders::{Order, OrderLine, OrderStatus};

use super::r#trait::{OrderStore, OrderUnitOfWork, StoreError};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    products: HashMap<ProductId, Product>,
    /// Product lock acquisitions in order, across all units of work.
    lock_trace: Vec<ProductId>,
}

/// In-memory order store.
///
/// Intended for tests/dev. A single async mutex stands in for row locking:
/// each unit of work holds the guard from `begin` until `commit`/`rollback`,
/// so units of work serialize. Writes are staged inside the unit of work and
/// applied on commit only; dropping without commit discards them.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of product-row lock acquisitions seen so far (test hook for
    /// asserting the canonical lock order).
    pub async fn product_lock_trace(&self) -> Vec<ProductId> {
        self.state.lock().await.lock_trace.clone()
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    staged_deltas: Vec<(ProductId, i64)>,
    staged_statuses: Vec<(OrderId, OrderStatus)>,
}

impl InMemoryUnitOfWork {
    fn staged_delta_for(&self, product_id: &ProductId) -> i64 {
        self.staged_deltas
            .iter()
            .filter(|(id, _)| id == product_id)
            .map(|(_, delta)| delta)
            .sum()
    }
}

#[async_trait]
impl OrderUnitOfWork for InMemoryUnitOfWork {
    async fn status_for_update(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<OrderStatus>, StoreError> {
        if let Some((_, staged)) = self
            .staged_statuses
            .iter()
            .rev()
            .find(|(id, _)| id == order_id)
        {
            return Ok(Some(*staged));
        }
        Ok(self.guard.orders.get(order_id).map(|order| order.status))
    }

    async fn lines(&mut self, order_id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self
            .guard
            .orders
            .get(order_id)
            .map(|order| order.lines.clone())
            .unwrap_or_default())
    }

    async fn stock_for_update(
        &mut self,
        product_id: &ProductId,
    ) -> Result<Option<i64>, StoreError> {
        self.guard.lock_trace.push(product_id.clone());
        let staged = self.staged_delta_for(product_id);
        Ok(self
            .guard
            .products
            .get(product_id)
            .map(|product| product.stock + staged))
    }

    async fn adjust_stock(
        &mut self,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<(), StoreError> {
        if !self.guard.products.contains_key(product_id) {
            return Err(StoreError::Backend(format!(
                "adjust_stock on unknown product {product_id}"
            )));
        }
        self.staged_deltas.push((product_id.clone(), delta));
        Ok(())
    }

    async fn set_status(
        &mut self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if !self.guard.orders.contains_key(order_id) {
            return Err(StoreError::Backend(format!(
                "set_status on unknown order {order_id}"
            )));
        }
        self.staged_statuses.push((order_id.clone(), status));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        // Stock underflow would mean the engine skipped its check; refuse
        // like the database CHECK constraint would.
        let mut net: HashMap<&ProductId, i64> = HashMap::new();
        for (product_id, delta) in &self.staged_deltas {
            *net.entry(product_id).or_insert(0) += delta;
        }
        for (product_id, delta) in net {
            let stock = self
                .guard
                .products
                .get(product_id)
                .map(|p| p.stock)
                .unwrap_or_default();
            if stock + delta < 0 {
                return Err(StoreError::Backend(format!(
                    "stock underflow for product {product_id}"
                )));
            }
        }

        for (product_id, delta) in std::mem::take(&mut self.staged_deltas) {
            if let Some(product) = self.guard.products.get_mut(&product_id) {
                product.stock += delta;
            }
        }
        for (order_id, status) in std::mem::take(&mut self.staged_statuses) {
            if let Some(order) = self.guard.orders.get_mut(&order_id) {
                order.status = status;
                order.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged writes die with the unit of work.
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderUnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            staged_deltas: Vec::new(),
            staged_statuses: Vec::new(),
        }))
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Backend(format!(
                "order id already taken: {}",
                order.id
            )));
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(order_id).cloned())
    }

    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.customer == Some(customer))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        Ok(orders)
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(product_id).cloned())
    }
}
