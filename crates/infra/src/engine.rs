//! Order status transition engine.
//!
//! One operation carries all the consistency weight in this system: take an
//! order id and a target status, validate the edge against the workflow,
//! apply the inventory side-effect the edge implies, persist the new status.
//! All of it runs inside one unit of work; every error path leaves zero
//! persisted changes.

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use bakehouse_core::{DomainError, OrderId, ProductId};
use bakehouse_orders::{InvalidTransition, Order, OrderDraft, OrderLine, OrderStatus, StockEffect};

use crate::store::r#trait::{OrderStore, OrderUnitOfWork, StoreError};

/// Failure modes of a transition attempt.
///
/// The first three are business-rule verdicts: they are reported verbatim
/// and state is untouched. `TransactionAborted` is infrastructure: the unit
/// of work rolled back and the whole operation may be retried from scratch
/// (re-reading the current status, which may have advanced).
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("order not found")]
    NotFound,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    #[error("transaction aborted: {0}")]
    TransactionAborted(#[from] StoreError),
}

impl TransitionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransitionError::TransactionAborted(_))
    }
}

/// Failure modes of placing a new order.
#[derive(Debug, Error)]
pub enum PlaceOrderError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// The order status transition engine.
///
/// Owns a storage backend and exposes the order-management operations the
/// request handlers call into. Cheap to clone when the backend is (e.g. an
/// `Arc`-wrapped store).
#[derive(Debug, Clone)]
pub struct TransitionEngine<S> {
    store: S,
}

impl<S: OrderStore> TransitionEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomically move an order to `target`.
    ///
    /// The order row is read under an exclusive lock, so concurrent
    /// transitions of the same order serialize and the loser re-validates
    /// against the advanced status. Product rows are locked in ascending
    /// product-id order.
    #[instrument(skip(self), fields(order_id = %order_id, target = %target), err)]
    pub async fn transition_order_status(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
    ) -> Result<(), TransitionError> {
        let mut uow = self.store.begin().await?;
        match apply_transition(uow.as_mut(), order_id, target).await {
            Ok(()) => {
                uow.commit().await?;
                Ok(())
            }
            Err(err) => {
                // A rollback failure cannot change the outcome; the
                // transaction is dead either way.
                let _ = uow.rollback().await;
                Err(err)
            }
        }
    }

    /// Validate and persist a new order (checkout or register sale).
    ///
    /// Stock is not touched here; reservation happens at confirmation.
    #[instrument(skip(self, draft), fields(order_id = %draft.id), err)]
    pub async fn place_order(&self, draft: OrderDraft) -> Result<Order, PlaceOrderError> {
        let order = draft.into_order(Utc::now())?;
        self.store.insert_order(&order).await?;
        Ok(order)
    }
}

/// The transactional body. Runs with the unit of work open; the caller
/// commits on `Ok` and rolls back on `Err`.
async fn apply_transition(
    uow: &mut dyn OrderUnitOfWork,
    order_id: &OrderId,
    target: OrderStatus,
) -> Result<(), TransitionError> {
    let current = uow
        .status_for_update(order_id)
        .await?
        .ok_or(TransitionError::NotFound)?;

    let effect = current.transition(target)?;

    match effect {
        StockEffect::Reserve => {
            for line in lines_in_lock_order(uow, order_id).await? {
                let stock = uow
                    .stock_for_update(&line.product_id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Backend(format!(
                            "order line references missing product {}",
                            line.product_id
                        ))
                    })?;
                if stock < line.quantity {
                    return Err(TransitionError::InsufficientStock {
                        product_id: line.product_id,
                    });
                }
                uow.adjust_stock(&line.product_id, -line.quantity).await?;
            }
        }
        StockEffect::Release => {
            // Restoring a reservation cannot underflow; no check needed.
            for line in lines_in_lock_order(uow, order_id).await? {
                uow.adjust_stock(&line.product_id, line.quantity).await?;
            }
        }
        StockEffect::None => {}
    }

    uow.set_status(order_id, target).await?;
    Ok(())
}

/// Line items sorted by ascending product id, the canonical product lock
/// order. Two orders confirming overlapping products in opposite line order
/// would otherwise deadlock.
async fn lines_in_lock_order(
    uow: &mut dyn OrderUnitOfWork,
    order_id: &OrderId,
) -> Result<Vec<OrderLine>, StoreError> {
    let mut lines = uow.lines(order_id).await?;
    lines.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    Ok(lines)
}
