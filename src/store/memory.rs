//! InMemoryStore - HashMap-backed catalog and order store for tests and local runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CheckoutBatch, CommerceStore, ProductQuery, StoreError, Versioned};
use crate::domain::aggregates::{CatalogProduct, Order};

#[derive(Default)]
struct State {
    products: HashMap<String, Versioned<CatalogProduct>>,
    orders: HashMap<String, Order>,
}

/// Clone-friendly via Arc; clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_products(products: impl IntoIterator<Item = CatalogProduct>) -> Result<Self, StoreError> {
        let store = Self::new();
        for product in products {
            store.upsert_product(product)?;
        }
        Ok(store)
    }

    /// Loads a JSON array of products, e.g. the file named by `CATALOG_SEED`.
    pub fn from_catalog_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path)?;
        let products: Vec<CatalogProduct> = serde_json::from_slice(&bytes)?;
        Self::with_products(products)
    }

    /// Inserts or replaces a product, bumping its version.
    pub fn upsert_product(&self, product: CatalogProduct) -> Result<u64, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned("write"))?;
        let version = state.products.get(&product.id).map_or(1, |p| p.version + 1);
        state.products.insert(product.id.clone(), Versioned { data: product, version });
        Ok(version)
    }

    /// Sets a product's stock outside of checkout, as another customer's purchase or a restock would.
    pub fn set_stock(&self, product_id: &str, stock_quantity: u32) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned("write"))?;
        let product = state.products.get_mut(product_id)
            .ok_or_else(|| StoreError::UnknownProduct(product_id.to_string()))?;
        product.data.stock_quantity = stock_quantity;
        product.data.updated_at = Utc::now();
        product.version += 1;
        Ok(())
    }

    pub fn remove_product(&self, product_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned("write"))?;
        Ok(state.products.remove(product_id).is_some())
    }

    pub fn orders(&self) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned("read"))?;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn product(&self, id: &str) -> Result<Option<Versioned<CatalogProduct>>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(state.products.get(id).cloned())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<CatalogProduct>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned("read"))?;
        let mut products: Vec<CatalogProduct> = state.products.values()
            .map(|p| &p.data)
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = query.limit { products.truncate(limit); }
        Ok(products)
    }

    async fn order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(state.orders.get(id).cloned())
    }

    async fn commit(&self, batch: CheckoutBatch) -> Result<Order, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned("write"))?;

        // Check every precondition before touching anything.
        for d in &batch.decrements {
            let current = state.products.get(&d.product_id).map(|p| p.version);
            if current != Some(d.expected_version) {
                return Err(StoreError::Conflict { product_id: d.product_id.clone(), expected: d.expected_version });
            }
        }

        let now = Utc::now();
        for d in &batch.decrements {
            if let Some(p) = state.products.get_mut(&d.product_id) {
                p.data.stock_quantity = d.new_stock;
                p.data.updated_at = now;
                p.version += 1;
            }
        }

        let order = batch.order.into_order(Uuid::now_v7().to_string(), now);
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }
}
