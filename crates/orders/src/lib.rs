//! Order domain: the status workflow, order entities, checkout validation.

pub mod draft;
pub mod order;
pub mod status;

pub use draft::{DraftLine, OrderDraft};
pub use order::{DeliveryDetails, Order, OrderLine};
pub use status::{InvalidTransition, OrderStatus, StockEffect};
