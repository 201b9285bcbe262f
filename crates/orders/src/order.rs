use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{CustomerId, EmployeeId, OrderId, ProductId};

use crate::status::OrderStatus;

/// Order line: product, quantity, and the unit price at order time.
///
/// `unit_price` is denormalized: a later catalog price change must not
/// rewrite the history of an already-placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

impl OrderLine {
    pub fn subtotal(&self) -> u64 {
        (self.quantity as u64) * self.unit_price
    }
}

/// Delivery details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub receiver: String,
    pub phone: String,
    pub address: String,
    pub note: Option<String>,
    pub date: NaiveDate,
    /// Requested time slot, e.g. "08:00-10:00".
    pub slot: String,
}

/// A placed order with its owned lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// `None` for walk-in sales taken at the register.
    pub customer: Option<CustomerId>,
    /// Employee who took the order, when it was placed at the counter.
    pub employee: Option<EmployeeId>,
    pub status: OrderStatus,
    /// Total in smallest currency unit.
    pub total: u64,
    pub delivery: DeliveryDetails,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn is_walk_in(&self) -> bool {
        self.customer.is_none()
    }
}
