//! Cart Aggregate
//!
//! Lines keep insertion order and are unique per product. Every line holds
//! `1 <= quantity <= stock_ceiling`; counts and totals are derived on read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::cart_store::PersistenceError;
use crate::domain::aggregates::product::CatalogProduct;
use crate::domain::events::CartEvent;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub image_ref: String,
    pub quantity: u32,
    pub stock_ceiling: u32,
}

impl CartLine {
    fn from_product(product: &CatalogProduct, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            image_ref: product.main_image_url.clone(),
            quantity,
            stock_ceiling: product.stock_quantity,
        }
    }

    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }

    fn is_valid(&self) -> bool { self.quantity >= 1 && self.quantity <= self.stock_ceiling }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from stored lines. Lines that break the quantity
    /// invariant and repeated products are dropped; the count of dropped lines is returned.
    pub fn restore(lines: Vec<CartLine>) -> (Self, usize) {
        let total = lines.len();
        let mut cart = Self::new();
        for line in lines {
            if line.is_valid() && cart.line(&line.product_id).is_none() && cart.totals_with(&line).is_some() {
                cart.lines.push(line);
            }
        }
        let dropped = total - cart.lines.len();
        (cart, dropped)
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line(&self, product_id: &str) -> Option<&CartLine> { self.lines.iter().find(|l| l.product_id == product_id) }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    // Every way into `lines` goes through `totals_with`, so these sums cannot overflow.
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
    pub fn total(&self) -> Decimal { self.lines.iter().map(CartLine::line_total).sum() }
    pub fn total_money(&self, currency: &str) -> Money { Money::new(self.total(), currency) }

    /// Item count and total with `line` in place of any line for the same product,
    /// or `None` when either would overflow.
    fn totals_with(&self, line: &CartLine) -> Option<(u32, Decimal)> {
        self.lines.iter()
            .filter(|l| l.product_id != line.product_id)
            .chain(std::iter::once(line))
            .try_fold((0u32, Decimal::ZERO), |(count, total), l| {
                let line_total = l.unit_price.checked_mul(Decimal::from(l.quantity))?;
                Some((count.checked_add(l.quantity)?, total.checked_add(line_total)?))
            })
    }

    /// Adds `quantity` of `product`, merging into an existing line. A request
    /// that would exceed the product's stock is rejected whole.
    pub fn add_item(&mut self, product: &CatalogProduct, quantity: u32) -> Result<CartEvent, CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        let stock_limit = || CartError::StockLimitExceeded {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            max: product.stock_quantity,
        };

        let position = self.lines.iter().position(|l| l.product_id == product.id);
        let candidate = match position {
            Some(i) => {
                let merged = self.lines[i].quantity.checked_add(quantity).ok_or_else(stock_limit)?;
                if merged > product.stock_quantity { return Err(stock_limit()); }
                CartLine { quantity: merged, stock_ceiling: product.stock_quantity, ..self.lines[i].clone() }
            }
            None => {
                if quantity > product.stock_quantity { return Err(stock_limit()); }
                CartLine::from_product(product, quantity)
            }
        };
        if self.totals_with(&candidate).is_none() { return Err(CartError::TotalOverflow); }
        match position {
            Some(i) => self.lines[i] = candidate,
            None => self.lines.push(candidate),
        }

        Ok(CartEvent::ItemAdded { product_id: product.id.clone(), product_name: product.name.clone(), quantity })
    }

    /// Removes the line for `product_id`. Absent products are a no-op.
    pub fn remove_item(&mut self, product_id: &str) -> Option<CartEvent> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        (self.lines.len() != before).then(|| CartEvent::ItemRemoved { product_id: product_id.to_string() })
    }

    /// Sets a line's quantity. Zero drops the line; a value above the
    /// line's stock ceiling is rejected and leaves the line as it was.
    pub fn update_quantity(&mut self, product_id: &str, quantity: u32) -> Result<Option<CartEvent>, CartError> {
        if quantity == 0 {
            let removed = self.remove_item(product_id).is_some();
            return Ok(removed.then(|| CartEvent::QuantityChanged { product_id: product_id.to_string(), quantity: 0 }));
        }
        let Some(i) = self.lines.iter().position(|l| l.product_id == product_id) else { return Ok(None) };
        let line = &self.lines[i];
        if quantity > line.stock_ceiling {
            return Err(CartError::StockLimitExceeded {
                product_id: line.product_id.clone(),
                product_name: line.name.clone(),
                max: line.stock_ceiling,
            });
        }
        if line.quantity == quantity { return Ok(None); }
        let candidate = CartLine { quantity, ..line.clone() };
        if self.totals_with(&candidate).is_none() { return Err(CartError::TotalOverflow); }
        self.lines[i] = candidate;
        Ok(Some(CartEvent::QuantityChanged { product_id: product_id.to_string(), quantity }))
    }

    pub fn clear(&mut self) -> CartEvent { self.lines.clear(); CartEvent::Cleared }
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Only {max} items available for {product_name}.")]
    StockLimitExceeded { product_id: String, product_name: String, max: u32 },
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("Cart total is too large.")]
    TotalOverflow,
    #[error("cart persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64, stock: u32) -> CatalogProduct {
        CatalogProduct::new(id, format!("Product {id}"), Decimal::new(price, 0), stock)
    }

    fn assert_invariants(cart: &Cart) {
        for line in cart.lines() {
            assert!(line.quantity >= 1 && line.quantity <= line.stock_ceiling, "{line:?}");
        }
        let total: Decimal = cart.lines().iter().map(|l| l.unit_price * Decimal::from(l.quantity)).sum();
        assert_eq!(cart.total(), total);
        assert_eq!(cart.item_count(), cart.lines().iter().map(|l| l.quantity).sum::<u32>());
    }

    #[test]
    fn test_add_rejects_over_stock() {
        let mut cart = Cart::new();
        let err = cart.add_item(&product("p1", 10, 5), 6).unwrap_err();
        assert!(matches!(err, CartError::StockLimitExceeded { max: 5, .. }));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_merge_rejects_whole() {
        let mut cart = Cart::new();
        let p = product("p1", 10, 5);
        cart.add_item(&p, 3).unwrap();
        let err = cart.add_item(&p, 3).unwrap_err();
        assert!(matches!(err, CartError::StockLimitExceeded { max: 5, .. }));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn test_add_merges_lines() {
        let mut cart = Cart::new();
        let p = product("p1", 10, 5);
        cart.add_item(&p, 2).unwrap();
        let event = cart.add_item(&p, 3).unwrap();
        assert_eq!(event, CartEvent::ItemAdded { product_id: "p1".into(), product_name: "Product p1".into(), quantity: 3 });
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 5);
        assert_invariants(&cart);
    }

    #[test]
    fn test_add_zero_is_invalid() {
        let mut cart = Cart::new();
        assert!(matches!(cart.add_item(&product("p1", 10, 5), 0), Err(CartError::InvalidQuantity)));
    }

    #[test]
    fn test_out_of_stock_cannot_be_added() {
        let mut cart = Cart::new();
        assert!(matches!(cart.add_item(&product("p1", 10, 0), 1), Err(CartError::StockLimitExceeded { max: 0, .. })));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::new();
        cart.add_item(&product("p1", 50, 10), 2).unwrap();
        cart.add_item(&CatalogProduct::new("p2", "Catnip", Decimal::new(1250, 2), 4), 3).unwrap();
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.total(), Decimal::new(13750, 2));
        assert_eq!(cart.total_money("PKR").to_string(), "PKR 137.50");
        assert_eq!(cart.lines()[0].product_id, "p1");
        assert_eq!(cart.lines()[1].product_id, "p2");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut cart = Cart::new();
        cart.add_item(&product("p1", 10, 5), 1).unwrap();
        cart.add_item(&product("p2", 10, 5), 1).unwrap();
        assert!(cart.remove_item("p1").is_some());
        let once = cart.clone();
        assert!(cart.remove_item("p1").is_none());
        assert_eq!(cart, once);
    }

    #[test]
    fn test_update_quantity() {
        let mut cart = Cart::new();
        cart.add_item(&product("p1", 10, 5), 1).unwrap();

        assert!(cart.update_quantity("p1", 4).unwrap().is_some());
        assert_eq!(cart.item_count(), 4);

        let err = cart.update_quantity("p1", 6).unwrap_err();
        assert!(matches!(err, CartError::StockLimitExceeded { max: 5, .. }));
        assert_eq!(cart.item_count(), 4);

        assert!(cart.update_quantity("missing", 2).unwrap().is_none());

        assert!(matches!(cart.update_quantity("p1", 0).unwrap(), Some(CartEvent::QuantityChanged { quantity: 0, .. })));
        assert!(cart.is_empty());
        assert!(cart.update_quantity("p1", 0).unwrap().is_none());
        assert_invariants(&cart);
    }

    #[test]
    fn test_restore_drops_invalid_lines() {
        let line = |id: &str, quantity, stock_ceiling| CartLine {
            product_id: id.into(), name: id.into(), unit_price: Decimal::ONE,
            image_ref: String::new(), quantity, stock_ceiling,
        };
        let (cart, dropped) = Cart::restore(vec![line("a", 1, 3), line("b", 0, 3), line("a", 2, 3), line("c", 4, 3)]);
        assert_eq!(dropped, 3);
        assert_eq!(cart.lines().len(), 1);
        assert_invariants(&cart);
    }

    #[test]
    fn test_mixed_sequence_keeps_invariants() {
        let mut cart = Cart::new();
        let a = product("a", 7, 3);
        let b = product("b", 11, 2);
        let _ = cart.add_item(&a, 2);
        let _ = cart.add_item(&b, 3);
        let _ = cart.add_item(&b, 2);
        let _ = cart.update_quantity("a", 9);
        let _ = cart.add_item(&a, 1);
        let _ = cart.update_quantity("b", 1);
        cart.remove_item("zzz");
        assert_invariants(&cart);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total(), Decimal::new(32, 0));
    }

    #[test]
    fn test_price_overflow_is_rejected() {
        let mut cart = Cart::new();
        let pricey = product("p1", 0, 10);
        let pricey = CatalogProduct { price: Decimal::MAX, ..pricey };
        cart.add_item(&pricey, 1).unwrap();
        assert!(matches!(cart.add_item(&pricey, 1), Err(CartError::TotalOverflow)));
        assert!(matches!(cart.add_item(&product("p2", 1, 5), 1), Err(CartError::TotalOverflow)));
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total(), Decimal::MAX);
    }

    #[test]
    fn test_item_count_overflow_is_rejected() {
        let mut cart = Cart::new();
        cart.add_item(&product("p1", 0, u32::MAX), u32::MAX).unwrap();
        assert!(matches!(cart.add_item(&product("p2", 0, 5), 1), Err(CartError::TotalOverflow)));
        assert_eq!(cart.item_count(), u32::MAX);

        cart.update_quantity("p1", 10).unwrap();
        cart.add_item(&product("p2", 0, 5), 1).unwrap();
        assert!(matches!(cart.update_quantity("p1", u32::MAX), Err(CartError::TotalOverflow)));
        assert_eq!(cart.item_count(), 11);
        assert_invariants(&cart);
    }

    #[test]
    fn test_restore_drops_overflowing_lines() {
        let line = |id: &str, price| CartLine {
            product_id: id.into(), name: id.into(), unit_price: price,
            image_ref: String::new(), quantity: 2, stock_ceiling: 2,
        };
        let (cart, dropped) = Cart::restore(vec![line("a", Decimal::ONE), line("b", Decimal::MAX)]);
        assert_eq!(dropped, 1);
        assert_eq!(cart.total(), Decimal::TWO);
    }
}
