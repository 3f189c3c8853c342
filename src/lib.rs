//! Feline & Friend storefront
//!
//! Session carts and stock-safe checkout for a small pet shop.
//!
//! ## Features
//! - Session carts with per-product stock ceilings, persisted on every change
//! - Checkout that re-reads stock and commits decrements and the order atomically
//! - In-memory and PostgreSQL catalog/order stores
//! - JSON API over carts, catalog and orders

pub mod cart_store;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod http;
pub mod notify;
pub mod store;

pub use cart_store::{CartPersistence, CartSessions, CartStore, InMemoryCartPersistence, JsonFileCartPersistence};
pub use checkout::{CheckoutError, CheckoutService};
pub use config::Config;
pub use domain::aggregates::{Cart, CartError, CartLine, CatalogProduct, Order, OrderStatus};
pub use domain::value_objects::DeliveryInfo;
pub use notify::{ChannelNotifier, Notification, NotificationSink, TracingNotifier};
pub use store::{CommerceStore, InMemoryStore, PgStore, StoreError};
