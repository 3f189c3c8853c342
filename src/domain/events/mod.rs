//! Domain events
use rust_decimal::Decimal;

#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CartEvent {
    ItemAdded { product_id: String, product_name: String, quantity: u32 },
    QuantityChanged { product_id: String, quantity: u32 },
    ItemRemoved { product_id: String },
    Cleared,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Placed { order_id: String, total: Decimal, currency: String },
}

impl From<CartEvent> for DomainEvent {
    fn from(e: CartEvent) -> Self { DomainEvent::Cart(e) }
}

impl From<OrderEvent> for DomainEvent {
    fn from(e: OrderEvent) -> Self { DomainEvent::Order(e) }
}
