//! Checkout validation: turning a submitted draft into a placeable order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{CustomerId, DomainError, DomainResult, EmployeeId, OrderId, ProductId};

use crate::order::{DeliveryDetails, Order, OrderLine};
use crate::status::OrderStatus;

/// One requested line of a draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Catalog price at the moment of checkout, smallest currency unit.
    pub unit_price: u64,
}

/// An order as submitted from checkout or the register, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub id: OrderId,
    pub customer: Option<CustomerId>,
    pub employee: Option<EmployeeId>,
    pub delivery: DeliveryDetails,
    pub lines: Vec<DraftLine>,
}

impl OrderDraft {
    /// Validate the draft and build the order that will be persisted.
    ///
    /// New orders always start `pending`. The total is computed from the
    /// lines, never taken from the submitter.
    pub fn into_order(self, now: DateTime<Utc>) -> DomainResult<Order> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("order needs at least one line"));
        }
        require_filled("receiver", &self.delivery.receiver)?;
        require_filled("phone", &self.delivery.phone)?;
        require_filled("address", &self.delivery.address)?;

        let mut lines = Vec::with_capacity(self.lines.len());
        let mut total: u64 = 0;
        for (idx, draft) in self.lines.into_iter().enumerate() {
            if draft.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if draft.unit_price == 0 {
                return Err(DomainError::validation("unit_price must be positive"));
            }
            let line = OrderLine {
                line_no: (idx as u32) + 1,
                product_id: draft.product_id,
                quantity: draft.quantity,
                unit_price: draft.unit_price,
            };
            total += line.subtotal();
            lines.push(line);
        }

        Ok(Order {
            id: self.id,
            customer: self.customer,
            employee: self.employee,
            status: OrderStatus::Pending,
            total,
            delivery: self.delivery,
            placed_at: now,
            updated_at: now,
            lines,
        })
    }
}

fn require_filled(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}
