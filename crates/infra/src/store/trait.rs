use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use bakehouse_catalog::Product;
use bakehouse_core::{CustomerId, OrderId, ProductId};
use bakehouse_orders::{Order, OrderLine, OrderStatus};

/// Storage operation error.
///
/// Infrastructure failures only. Business-rule outcomes (unknown order,
/// forbidden edge, short stock) are expressed by the engine's error type,
/// never here.
///
/// ## Error Categories
///
/// - **Aborted**: the unit of work was terminated by the backend and rolled
///   back in full (deadlock victim, serialization failure, lock timeout,
///   lost connection). The caller may retry the whole operation from
///   scratch; current state must be re-read because it may have advanced.
/// - **Backend**: any other storage failure (constraint violation,
///   malformed row, pool misconfiguration). Not retryable as-is.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Aborted(_))
    }
}

/// One atomic unit of work against the order store.
///
/// Row locks taken through `*_for_update` are held until `commit` or
/// `rollback`. Writes staged through `adjust_stock`/`set_status` become
/// visible to other readers only on `commit`; a unit of work dropped
/// without committing abandons every staged write.
#[async_trait]
pub trait OrderUnitOfWork: Send {
    /// Read an order's current status under an exclusive row lock.
    ///
    /// A concurrent transition on the same order blocks here until this
    /// unit of work ends.
    async fn status_for_update(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<OrderStatus>, StoreError>;

    /// Line items of an order, in line-number order.
    async fn lines(&mut self, order_id: &OrderId) -> Result<Vec<OrderLine>, StoreError>;

    /// Read a product's stock count under an exclusive row lock.
    async fn stock_for_update(
        &mut self,
        product_id: &ProductId,
    ) -> Result<Option<i64>, StoreError>;

    /// Stage a stock delta for a product row (negative to reserve,
    /// positive to release).
    async fn adjust_stock(&mut self, product_id: &ProductId, delta: i64)
        -> Result<(), StoreError>;

    /// Stage a new status for an order row.
    async fn set_status(
        &mut self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    /// Make every staged write durable and release all locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every staged write and release all locks.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Order and product storage.
///
/// `begin` opens the transactional seam the transition engine runs in; the
/// remaining operations are the conventional single-shot reads/writes the
/// request handlers need around it.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Start a unit of work (scoped transaction).
    async fn begin(&self) -> Result<Box<dyn OrderUnitOfWork>, StoreError>;

    /// Persist a new order and its lines atomically.
    ///
    /// Fails if the order id is already taken. Stock is not touched;
    /// reservation happens at confirmation.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Fetch an order with its lines.
    async fn order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// A customer's orders, newest first.
    async fn orders_for_customer(&self, customer: CustomerId)
        -> Result<Vec<Order>, StoreError>;

    /// Create or replace a catalog product row (seeding/catalog seam).
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Fetch a product.
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn OrderUnitOfWork>, StoreError> {
        (**self).begin().await
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        (**self).insert_order(order).await
    }

    async fn order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        (**self).order(order_id).await
    }

    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, StoreError> {
        (**self).orders_for_customer(customer).await
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        (**self).upsert_product(product).await
    }

    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(product_id).await
    }
}
