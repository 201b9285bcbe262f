//! Infrastructure layer: storage backends and the order transition engine.

pub mod engine;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use engine::{PlaceOrderError, TransitionEngine, TransitionError};
pub use store::{InMemoryOrderStore, OrderStore, OrderUnitOfWork, PgOrderStore, StoreError};
