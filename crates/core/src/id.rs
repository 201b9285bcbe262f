//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an order.
///
/// Generated outside this core (at checkout or the register) and unique
/// storewide. Receipts print it as `#<id>`, so parsing accepts an optional
/// leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Parse a caller-supplied order id.
    ///
    /// Trims surrounding whitespace and strips one leading `#`.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("OrderId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Product SKU.
///
/// Ordered lexicographically; ascending id order is the canonical product
/// lock order during a transition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("ProductId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of a customer account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(i32);

/// Identifier of an employee.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(i32);

macro_rules! impl_serial_newtype {
    ($t:ty) => {
        impl $t {
            /// Wrap a serial (database-assigned) integer.
            pub fn new(id: i32) -> Self {
                Self(id)
            }

            pub fn get(self) -> i32 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i32> for $t {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i32 {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_serial_newtype!(CustomerId);
impl_serial_newtype!(EmployeeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_strips_hash_and_whitespace() {
        let id = OrderId::parse("  #ORD-2024-0001 ").unwrap();
        assert_eq!(id.as_str(), "ORD-2024-0001");
    }

    #[test]
    fn order_id_rejects_empty_input() {
        assert!(matches!(OrderId::parse("  "), Err(DomainError::InvalidId(_))));
        assert!(matches!(OrderId::parse("#"), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn product_id_orders_lexicographically() {
        let a = ProductId::parse("SKU-APPLE").unwrap();
        let b = ProductId::parse("SKU-BAGUETTE").unwrap();
        assert!(a < b);
    }

    #[test]
    fn product_id_rejects_blank_sku() {
        assert!(ProductId::parse("").is_err());
        assert!(ProductId::parse("   ").is_err());
    }
}
