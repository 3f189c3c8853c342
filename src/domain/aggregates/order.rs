//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use crate::domain::aggregates::cart::{Cart, CartLine};
use crate::domain::value_objects::{DeliveryInfo, Money};

/// A frozen copy of a cart line taken at checkout. Later catalog changes never touch it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub image_ref: String,
}

impl From<&CartLine> for OrderLineItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            product_name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            subtotal: line.line_total(),
            image_ref: line.image_ref.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Everything about an order except what the store assigns on creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer_ref: Option<String>,
    pub line_items: Vec<OrderLineItem>,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub delivery_info: DeliveryInfo,
}

impl OrderDraft {
    pub fn from_cart(cart: &Cart, customer_ref: Option<String>, delivery_info: DeliveryInfo, currency: &str) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::NoItems); }
        let line_items: Vec<OrderLineItem> = cart.lines().iter().map(OrderLineItem::from).collect();
        Ok(Self { customer_ref, line_items, total_amount: cart.total(), currency: currency.to_string(), status: OrderStatus::Pending, delivery_info })
    }

    /// Attaches the identifier and timestamps handed out by the store.
    pub fn into_order(self, id: impl Into<String>, created_at: DateTime<Utc>) -> Order {
        Order {
            id: id.into(), customer_ref: self.customer_ref, line_items: self.line_items,
            total_amount: self.total_amount, currency: self.currency, status: self.status,
            delivery_info: self.delivery_info, created_at, updated_at: created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_ref: Option<String>,
    pub line_items: Vec<OrderLineItem>,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub delivery_info: DeliveryInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> Money { Money::new(self.total_amount, &self.currency) }
    pub fn item_count(&self) -> u32 { self.line_items.iter().fold(0u32, |n, i| n.saturating_add(i.quantity)) }

    /// Whether the total matches the line subtotals and each subtotal matches its quantity and price.
    /// Stored orders are not trusted to be in range, so overflow counts as inconsistent.
    pub fn is_consistent(&self) -> bool {
        let lines_ok = self.line_items.iter()
            .all(|i| i.unit_price.checked_mul(Decimal::from(i.quantity)) == Some(i.subtotal));
        let sum = self.line_items.iter().try_fold(Decimal::ZERO, |acc, i| acc.checked_add(i.subtotal));
        lines_ok && sum == Some(self.total_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("No items")]
    NoItems,
    #[error("Unknown order status `{0}`")]
    UnknownStatus(String),
}
