//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{CatalogProduct, ProductKind, StockStatus};
pub use order::{Order, OrderDraft, OrderError, OrderLineItem, OrderStatus};
pub use cart::{Cart, CartError, CartLine};
