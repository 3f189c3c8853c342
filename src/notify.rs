//! Fire-and-forget user notifications (the storefront's toasts).

use serde::Serialize;
use tokio::sync::mpsc;
use crate::domain::events::{CartEvent, DomainEvent, OrderEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel { Info, Destructive }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Info, title: title.into(), description: description.into() }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Destructive, title: title.into(), description: description.into() }
    }

    /// The message a customer sees for an event, if any.
    pub fn for_event(event: &DomainEvent) -> Option<Self> {
        match event {
            DomainEvent::Cart(CartEvent::ItemAdded { product_name, .. }) => {
                Some(Self::info("Added to cart", format!("{product_name} has been added to your cart.")))
            }
            DomainEvent::Cart(CartEvent::ItemRemoved { .. }) => {
                Some(Self::info("Item removed", "Item has been removed from your cart."))
            }
            DomainEvent::Cart(CartEvent::QuantityChanged { .. } | CartEvent::Cleared) => None,
            DomainEvent::Order(OrderEvent::Placed { .. }) => {
                Some(Self::info("Order Placed!", "Thank you for your purchase."))
            }
        }
    }
}

/// Receives notifications. Delivery is never awaited and never retried.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Info => tracing::info!(title = %n.title, description = %n.description, "notification"),
            NotificationLevel::Destructive => tracing::warn!(title = %n.title, description = %n.description, "notification"),
        }
    }
}

/// Forwards notifications into an unbounded channel. A closed receiver drops them silently.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}
