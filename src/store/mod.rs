//! Catalog and order storage.
//!
//! Product reads carry a version. A [`CheckoutBatch`] stages stock writes
//! conditioned on those versions together with one new order; stores apply the
//! whole batch or nothing, and reject it when any version has moved on.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::aggregates::{CatalogProduct, Order, OrderDraft};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Featured listings show at most this many products.
pub const FEATURED_LIMIT: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Set a product's stock to `new_stock`, provided it is still at `expected_version`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockDecrement {
    pub product_id: String,
    pub expected_version: u64,
    pub new_stock: u32,
}

#[derive(Clone, Debug)]
pub struct CheckoutBatch {
    pub decrements: Vec<StockDecrement>,
    pub order: OrderDraft,
}

/// Filters for catalog listings. Unlisted products are never returned.
#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub featured_only: bool,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

impl ProductQuery {
    pub fn featured() -> Self { Self { featured_only: true, category: None, limit: Some(FEATURED_LIMIT) } }

    pub fn matches(&self, product: &CatalogProduct) -> bool {
        product.is_listed
            && (!self.featured_only || product.is_featured)
            && self.category.as_deref().map_or(true, |c| product.category.as_deref() == Some(c))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("product {product_id} changed since it was read (expected version {expected})")]
    Conflict { product_id: String, expected: u64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unknown product {0}")]
    UnknownProduct(String),
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool { matches!(self, StoreError::Conflict { .. }) }
}

#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Point read of a product with its current version.
    async fn product(&self, id: &str) -> Result<Option<Versioned<CatalogProduct>>, StoreError>;

    /// Listed products matching `query`, ordered by name.
    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<CatalogProduct>, StoreError>;

    async fn order(&self, id: &str) -> Result<Option<Order>, StoreError>;

    /// Applies every decrement and creates the order as one atomic unit. The
    /// store assigns the order id and timestamps.
    async fn commit(&self, batch: CheckoutBatch) -> Result<Order, StoreError>;
}
