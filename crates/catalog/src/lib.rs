//! Catalog domain: products and their sellable stock.

pub mod product;

pub use product::Product;
