//! JSON API over the cart store and checkout.

pub mod error;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cart_store::{CartSessions, CartStore};
use crate::checkout::CheckoutService;
use crate::domain::aggregates::{CartLine, CatalogProduct, Order, StockStatus};
use crate::domain::value_objects::DeliveryInfo;
use crate::store::{CommerceStore, ProductQuery};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CommerceStore>,
    pub carts: Arc<CartSessions>,
    pub checkout: Arc<CheckoutService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "feline-storefront"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items", post(add_item))
        .route("/api/v1/cart/:session/items/:product_id", put(update_quantity).delete(remove_item))
        .route("/api/v1/checkout/:session", post(checkout))
        .route("/api/v1/orders/:id", get(get_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: CatalogProduct,
    pub stock_status: StockStatus,
}

impl From<CatalogProduct> for ProductView {
    fn from(product: CatalogProduct) -> Self { Self { stock_status: product.stock_status(), product } }
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub session: String,
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub total: Decimal,
    pub currency: String,
}

impl CartView {
    fn new(cart: &CartStore, currency: &str) -> Self {
        Self {
            session: cart.key().to_string(), lines: cart.lines().to_vec(),
            item_count: cart.item_count(), total: cart.total(), currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams { pub featured: Option<bool>, pub category: Option<String> }

#[derive(Debug, Deserialize)]
pub struct AddItemRequest { pub product_id: String, pub quantity: Option<u32> }

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest { pub quantity: i64 }

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest { pub customer_ref: Option<String>, pub delivery: DeliveryInfo }

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Vec<ProductView>>, ApiError> {
    let mut query = if p.featured.unwrap_or(false) { ProductQuery::featured() } else { ProductQuery::default() };
    query.category = p.category;
    let products = s.store.list_products(&query).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<ProductView>, ApiError> {
    let product = s.store.product(&id).await?.ok_or(ApiError::NotFound("product"))?;
    Ok(Json(product.data.into()))
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.session(&session).await?;
    let cart = cart.lock().await;
    Ok(Json(CartView::new(&cart, s.checkout.currency())))
}

async fn add_item(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItemRequest>) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.session(&session).await?;
    let product = s.store.product(&r.product_id).await?.ok_or(ApiError::NotFound("product"))?;
    let mut cart = cart.lock().await;
    cart.add_item(&product.data, r.quantity.unwrap_or(1)).await?;
    Ok(Json(CartView::new(&cart, s.checkout.currency())))
}

async fn update_quantity(
    State(s): State<AppState>,
    Path((session, product_id)): Path<(String, String)>,
    Json(r): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>, ApiError> {
    // Anything at or below zero removes the line.
    let quantity = u32::try_from(r.quantity.max(0)).unwrap_or(u32::MAX);
    let cart = s.carts.session(&session).await?;
    let mut cart = cart.lock().await;
    cart.update_quantity(&product_id, quantity).await?;
    Ok(Json(CartView::new(&cart, s.checkout.currency())))
}

async fn remove_item(State(s): State<AppState>, Path((session, product_id)): Path<(String, String)>) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.session(&session).await?;
    let mut cart = cart.lock().await;
    cart.remove_item(&product_id).await?;
    Ok(Json(CartView::new(&cart, s.checkout.currency())))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.session(&session).await?;
    let mut cart = cart.lock().await;
    cart.clear().await?;
    Ok(Json(CartView::new(&cart, s.checkout.currency())))
}

async fn checkout(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<Order>), ApiError> {
    let cart = s.carts.session(&session).await?;
    let mut cart = cart.lock().await;
    let order = s.checkout.place_order(&mut cart, r.customer_ref, r.delivery).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    s.store.order(&id).await?.map(Json).ok_or(ApiError::NotFound("order"))
}
