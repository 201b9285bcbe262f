use serde::{Deserialize, Serialize};

use bakehouse_core::{DomainError, DomainResult, ProductId};

/// A catalog product.
///
/// `stock` counts sellable units and is never negative. Outside catalog
/// seeding it changes only through the order transition engine's unit of
/// work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub stock: i64,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        price: u64,
        stock: i64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be empty"));
        }
        if stock < 0 {
            return Err(DomainError::invariant("stock must not be negative"));
        }
        Ok(Self {
            id,
            name,
            price,
            stock,
        })
    }

    /// Whether `quantity` units could be reserved right now.
    pub fn can_fulfill(&self, quantity: i64) -> bool {
        quantity > 0 && self.stock >= quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    #[test]
    fn new_rejects_negative_stock() {
        let err = Product::new(sku("SKU-RYE"), "Rye loaf", 6_000, -1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn new_rejects_blank_name() {
        let err = Product::new(sku("SKU-RYE"), "  ", 6_000, 4).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn can_fulfill_checks_the_boundary() {
        let product = Product::new(sku("SKU-RYE"), "Rye loaf", 6_000, 2).unwrap();
        assert!(product.can_fulfill(2));
        assert!(!product.can_fulfill(3));
        assert!(!product.can_fulfill(0));
    }
}
