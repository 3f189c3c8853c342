//! PostgreSQL store. Stock decrements are conditional updates on the product's
//! `version` column inside one transaction, together with the order insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use super::{CheckoutBatch, CommerceStore, ProductQuery, StoreError, Versioned};
use crate::domain::aggregates::{CatalogProduct, Order, OrderLineItem, OrderStatus, ProductKind};
use crate::domain::value_objects::DeliveryInfo;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String, name: String, kind: String, category: Option<String>, description: String,
    price: Decimal, currency: String, stock_quantity: i32, main_image_url: String,
    gallery_image_urls: Vec<String>, is_featured: bool, is_listed: bool,
    rating_average: f64, rating_count: i32, version: i64,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String, customer_ref: Option<String>, total_amount: Decimal, currency: String, status: String,
    delivery_info: Json<DeliveryInfo>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    product_id: String, product_name: String, quantity: i32, unit_price: Decimal, subtotal: Decimal, image_ref: String,
}

fn corrupt(what: impl std::fmt::Display) -> StoreError { StoreError::Corrupt(what.to_string()) }

impl TryFrom<ProductRow> for Versioned<CatalogProduct> {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, StoreError> {
        let kind = match r.kind.as_str() {
            "cat" => ProductKind::Cat,
            "pet_product" => ProductKind::PetProduct,
            other => return Err(corrupt(format_args!("product {} has kind `{other}`", r.id))),
        };
        let stock_quantity = u32::try_from(r.stock_quantity).map_err(|_| corrupt(format_args!("product {} has negative stock", r.id)))?;
        let version = u64::try_from(r.version).map_err(|_| corrupt(format_args!("product {} has negative version", r.id)))?;
        Ok(Versioned {
            data: CatalogProduct {
                id: r.id, name: r.name, kind, category: r.category, description: r.description,
                price: r.price, currency: r.currency, stock_quantity, main_image_url: r.main_image_url,
                gallery_image_urls: r.gallery_image_urls, is_featured: r.is_featured, is_listed: r.is_listed,
                rating_average: r.rating_average, rating_count: u32::try_from(r.rating_count).unwrap_or(0),
                created_at: r.created_at, updated_at: r.updated_at,
            },
            version,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderLineItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> Result<Self, StoreError> {
        Ok(Self {
            quantity: u32::try_from(r.quantity).map_err(|_| corrupt(format_args!("order item {} has negative quantity", r.product_id)))?,
            product_id: r.product_id, product_name: r.product_name,
            unit_price: r.unit_price, subtotal: r.subtotal, image_ref: r.image_ref,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, kind, category, description, price, currency, stock_quantity, main_image_url, \
    gallery_image_urls, is_featured, is_listed, rating_average, rating_count, version, created_at, updated_at";

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for PgStore {
    async fn product(&self, id: &str) -> Result<Option<Versioned<CatalogProduct>>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql).bind(id).fetch_optional(&self.pool).await?
            .map(Versioned::try_from).transpose()
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<CatalogProduct>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_listed AND (NOT $1 OR is_featured) AND ($2::TEXT IS NULL OR category = $2) \
             ORDER BY name ASC LIMIT $3"
        );
        let limit = query.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(query.featured_only).bind(&query.category).bind(limit)
            .fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| Versioned::try_from(r).map(|v| v.data)).collect()
    }

    async fn order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(
            "SELECT id, customer_ref, total_amount, currency, status, delivery_info, created_at, updated_at FROM orders WHERE id = $1",
        ).bind(id).fetch_optional(&self.pool).await? else { return Ok(None) };

        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT product_id, product_name, quantity, unit_price, subtotal, image_ref FROM order_items WHERE order_id = $1 ORDER BY position",
        ).bind(id).fetch_all(&self.pool).await?;

        Ok(Some(Order {
            status: row.status.parse::<OrderStatus>().map_err(corrupt)?,
            line_items: items.into_iter().map(OrderLineItem::try_from).collect::<Result<_, _>>()?,
            id: row.id, customer_ref: row.customer_ref, total_amount: row.total_amount, currency: row.currency,
            delivery_info: row.delivery_info.0, created_at: row.created_at, updated_at: row.updated_at,
        }))
    }

    async fn commit(&self, batch: CheckoutBatch) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        for d in &batch.decrements {
            let new_stock = i32::try_from(d.new_stock).map_err(|_| corrupt(format_args!("stock overflow for {}", d.product_id)))?;
            let expected = i64::try_from(d.expected_version).map_err(|_| corrupt(format_args!("version overflow for {}", d.product_id)))?;
            let result = sqlx::query(
                "UPDATE products SET stock_quantity = $1, version = version + 1, updated_at = NOW() WHERE id = $2 AND version = $3",
            ).bind(new_stock).bind(&d.product_id).bind(expected).execute(&mut *tx).await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict { product_id: d.product_id.clone(), expected: d.expected_version });
            }
        }

        let id = Uuid::now_v7().to_string();
        let order = &batch.order;
        let (created_at,): (DateTime<Utc>,) = sqlx::query_as(
            "INSERT INTO orders (id, customer_ref, total_amount, currency, status, delivery_info, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING created_at",
        )
        .bind(&id).bind(&order.customer_ref).bind(order.total_amount).bind(&order.currency)
        .bind(order.status.as_str()).bind(Json(&order.delivery_info))
        .fetch_one(&mut *tx).await?;

        for (position, item) in order.line_items.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| corrupt("too many order items"))?;
            let quantity = i32::try_from(item.quantity).map_err(|_| corrupt(format_args!("quantity overflow for {}", item.product_id)))?;
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, product_name, quantity, unit_price, subtotal, image_ref) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&id).bind(position).bind(&item.product_id).bind(&item.product_name)
            .bind(quantity).bind(item.unit_price).bind(item.subtotal).bind(&item.image_ref)
            .execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(batch.order.into_order(id, created_at))
    }
}
