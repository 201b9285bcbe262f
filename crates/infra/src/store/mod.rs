//! Order/product storage boundary.
//!
//! This module defines the unit-of-work abstraction the transition engine
//! runs against, without making storage assumptions: the PostgreSQL backend
//! is production, the in-memory backend serves tests/dev.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;
pub use r#trait::{OrderStore, OrderUnitOfWork, StoreError};
