//! Checkout: turns a session cart and delivery details into an order.
//!
//! Stock for every line is re-read from the store before anything is staged.
//! The decrements and the new order are then committed as one batch that is
//! conditioned on the versions read, so a concurrent purchase in between
//! fails the commit instead of overselling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use validator::{Validate, ValidationErrors};

use crate::cart_store::CartStore;
use crate::domain::aggregates::{CartLine, Order, OrderDraft};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{DeliveryInfo, DEFAULT_CURRENCY};
use crate::notify::{Notification, NotificationSink};
use crate::store::{CheckoutBatch, CommerceStore, StockDecrement, StoreError};

pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("invalid delivery details: {0}")]
    InvalidDelivery(#[from] ValidationErrors),
    #[error("Product {product_name} not found.")]
    ProductNotFound { product_id: String, product_name: String },
    #[error("Not enough stock for {product_name}. Only {available} left.")]
    InsufficientStock { product_id: String, product_name: String, available: u32 },
    #[error("could not verify stock: {0}")]
    StockVerification(#[source] StoreError),
    #[error("order conflicted with a concurrent change: {0}")]
    CommitConflict(#[source] StoreError),
    #[error("order commit failed: {0}")]
    CommitFailed(#[source] StoreError),
    #[error("order commit timed out after {0:?}")]
    CommitTimeout(Duration),
}

impl CheckoutError {
    /// What the customer is told.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Add items to your cart to proceed to checkout.".to_string(),
            Self::InvalidDelivery(_) => "Please check your delivery details.".to_string(),
            Self::ProductNotFound { .. } | Self::InsufficientStock { .. } => self.to_string(),
            Self::StockVerification(_) => "Could not verify product stock. Please try again.".to_string(),
            Self::CommitConflict(_) | Self::CommitFailed(_) | Self::CommitTimeout(_) => {
                "There was an issue placing your order. Please try again.".to_string()
            }
        }
    }

    /// Failures where resubmitting the same cart may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StockVerification(_) | Self::CommitConflict(_) | Self::CommitFailed(_) | Self::CommitTimeout(_))
    }
}

pub struct CheckoutService {
    store: Arc<dyn CommerceStore>,
    notifier: Arc<dyn NotificationSink>,
    currency: String,
    commit_timeout: Duration,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn CommerceStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier, currency: DEFAULT_CURRENCY.to_string(), commit_timeout: DEFAULT_COMMIT_TIMEOUT }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self { self.currency = currency.into(); self }
    pub fn with_commit_timeout(mut self, commit_timeout: Duration) -> Self { self.commit_timeout = commit_timeout; self }

    pub fn currency(&self) -> &str { &self.currency }

    /// Places an order for everything in `cart`. On success the cart is
    /// cleared; on any failure it is left exactly as it was.
    #[tracing::instrument(skip_all, fields(cart = %cart.key(), lines = cart.lines().len()))]
    pub async fn place_order(
        &self,
        cart: &mut CartStore,
        customer_ref: Option<String>,
        delivery: DeliveryInfo,
    ) -> Result<Order, CheckoutError> {
        match self.try_place_order(cart, customer_ref, delivery).await {
            Ok(order) => {
                tracing::info!(order_id = %order.id, total = %order.total_amount, "order placed");
                let event = DomainEvent::from(OrderEvent::Placed {
                    order_id: order.id.clone(), total: order.total_amount, currency: order.currency.clone(),
                });
                if let Some(n) = Notification::for_event(&event) { self.notifier.notify(n); }
                Ok(order)
            }
            Err(error) => {
                tracing::warn!(%error, retryable = error.is_retryable(), "order failed");
                self.notifier.notify(Notification::destructive("Order Failed", error.user_message()));
                Err(error)
            }
        }
    }

    async fn try_place_order(
        &self,
        cart: &mut CartStore,
        customer_ref: Option<String>,
        delivery: DeliveryInfo,
    ) -> Result<Order, CheckoutError> {
        if cart.is_empty() { return Err(CheckoutError::EmptyCart); }
        delivery.validate()?;

        let decrements = self.verify_stock(cart.lines()).await?;
        let order = OrderDraft::from_cart(cart.cart(), customer_ref, delivery, &self.currency)
            .map_err(|_| CheckoutError::EmptyCart)?;

        let order = match timeout(self.commit_timeout, self.store.commit(CheckoutBatch { decrements, order })).await {
            Err(_) => return Err(CheckoutError::CommitTimeout(self.commit_timeout)),
            Ok(Err(e)) if e.is_conflict() => return Err(CheckoutError::CommitConflict(e)),
            Ok(Err(e)) => return Err(CheckoutError::CommitFailed(e)),
            Ok(Ok(order)) => order,
        };

        // The order is durable at this point. The cart is emptied in memory either way;
        // only the stored copy can lag behind.
        if let Err(error) = cart.clear_after_order().await {
            tracing::error!(order_id = %order.id, %error, "order placed but cleared cart could not be saved");
        }
        Ok(order)
    }

    /// Reads every line's product and stages its decrement. Nothing is written here.
    async fn verify_stock(&self, lines: &[CartLine]) -> Result<Vec<StockDecrement>, CheckoutError> {
        let mut decrements = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self.store.product(&line.product_id).await
                .map_err(CheckoutError::StockVerification)?
                .ok_or_else(|| CheckoutError::ProductNotFound {
                    product_id: line.product_id.clone(),
                    product_name: line.name.clone(),
                })?;

            let new_stock = product.data.stock_after(line.quantity).ok_or_else(|| CheckoutError::InsufficientStock {
                product_id: line.product_id.clone(),
                product_name: line.name.clone(),
                available: product.data.stock_quantity,
            })?;

            tracing::debug!(product_id = %line.product_id, stock = product.data.stock_quantity, requested = line.quantity, "stock verified");
            decrements.push(StockDecrement { product_id: line.product_id.clone(), expected_version: product.version, new_stock });
        }
        Ok(decrements)
    }
}
