//! Order status workflow.
//!
//! The workflow is a fixed five-state machine. `transition` is total: every
//! `(from, to)` pair gets an explicit verdict, either the inventory
//! side-effect the edge carries or a typed rejection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bakehouse_core::DomainError;

/// Order status lifecycle.
///
/// `Completed` and `Cancelled` are terminal: no edge leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Delivering,
    Completed,
    Cancelled,
}

/// Inventory side-effect implied by a legal status edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Decrement each line's product stock by the line quantity.
    Reserve,
    /// Increment each line's product stock back by the line quantity.
    Release,
    /// Stock untouched.
    None,
}

/// Rejection verdict for a status change the workflow forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Delivering,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Verdict for moving from `self` to `to`.
    ///
    /// Stock is reserved only on `pending -> confirmed` and released only on
    /// `confirmed -> cancelled`; every other legal edge leaves stock alone
    /// (nothing was reserved yet, or the reservation was already settled).
    pub fn transition(self, to: OrderStatus) -> Result<StockEffect, InvalidTransition> {
        use OrderStatus::*;

        match (self, to) {
            (Pending, Confirmed) => Ok(StockEffect::Reserve),
            (Confirmed, Cancelled) => Ok(StockEffect::Release),
            (Pending, Cancelled)
            | (Confirmed, Delivering)
            | (Delivering, Completed)
            | (Delivering, Cancelled) => Ok(StockEffect::None),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }

    /// Statuses reachable from `self` in one step.
    pub fn successors(self) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Delivering, Cancelled],
            Delivering => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Lowercase spelling persisted in the `orders.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "delivering" => Ok(OrderStatus::Delivering),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}
