//! Catalog Product

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Products at or below this level (and above zero) are shown as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// A product as the catalog stores it. Checkout treats `stock_quantity` as authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ProductKind,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub stock_quantity: u32,
    #[serde(default)]
    pub main_image_url: String,
    #[serde(default)]
    pub gallery_image_urls: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_listed")]
    pub is_listed: bool,
    #[serde(default)]
    pub rating_average: f64,
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_currency() -> String { crate::domain::value_objects::DEFAULT_CURRENCY.to_string() }
fn default_listed() -> bool { true }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Cat,
    #[default]
    PetProduct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus { InStock, LowStock, OutOfStock }

impl CatalogProduct {
    /// Builds a listed pet product with the default currency. Mostly useful for seeding.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal, stock_quantity: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(), name: name.into(), kind: ProductKind::default(), category: None,
            description: String::new(), price, currency: default_currency(), stock_quantity,
            main_image_url: String::new(), gallery_image_urls: vec![], is_featured: false,
            is_listed: true, rating_average: 0.0, rating_count: 0, created_at: now, updated_at: now,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.main_image_url = url.into(); self }
    pub fn with_category(mut self, category: impl Into<String>) -> Self { self.category = Some(category.into()); self }
    pub fn featured(mut self) -> Self { self.is_featured = true; self }

    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }

    pub fn stock_status(&self) -> StockStatus {
        match self.stock_quantity {
            0 => StockStatus::OutOfStock,
            n if n <= LOW_STOCK_THRESHOLD => StockStatus::LowStock,
            _ => StockStatus::InStock,
        }
    }

    /// Stock remaining after taking `quantity`, or `None` when there is not enough.
    pub fn stock_after(&self, quantity: u32) -> Option<u32> {
        self.stock_quantity.checked_sub(quantity)
    }
}
