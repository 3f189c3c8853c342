//! The session cart store: a [`Cart`] bound to its persistence key and a notification sink.

use std::sync::Arc;

use rust_decimal::Decimal;

use super::persistence::{CartPersistence, CartSnapshot};
use crate::domain::aggregates::{Cart, CartError, CartLine, CatalogProduct};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::notify::{Notification, NotificationSink};

pub struct CartStore {
    key: String,
    cart: Cart,
    // Set while storage holds something other than `cart`; the next successful save resets it.
    unsaved: bool,
    persistence: Arc<dyn CartPersistence>,
    notifier: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("key", &self.key)
            .field("cart", &self.cart)
            .field("unsaved", &self.unsaved)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Opens the cart stored under `key`, or an empty one if nothing was saved yet.
    /// A stored cart that needed cleaning up is written back in its cleaned form.
    pub async fn open(
        key: impl Into<String>,
        persistence: Arc<dyn CartPersistence>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, CartError> {
        let key = key.into();
        let (cart, dropped) = match persistence.load(&key).await? {
            Some(snapshot) => Cart::restore(snapshot.lines),
            None => (Cart::new(), 0),
        };
        let mut store = Self { key, cart, unsaved: false, persistence, notifier };
        if dropped > 0 {
            tracing::warn!(cart = %store.key, dropped, "dropped invalid lines from stored cart");
            if let Err(error) = store.save_current().await {
                tracing::warn!(cart = %store.key, %error, "could not write back cleaned cart");
            }
        }
        tracing::debug!(cart = %store.key, lines = store.cart.lines().len(), "cart opened");
        Ok(store)
    }

    pub fn key(&self) -> &str { &self.key }
    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn lines(&self) -> &[CartLine] { self.cart.lines() }
    pub fn item_count(&self) -> u32 { self.cart.item_count() }
    pub fn total(&self) -> Decimal { self.cart.total() }
    pub fn is_empty(&self) -> bool { self.cart.is_empty() }

    /// Whether storage is behind the in-memory cart.
    pub fn is_unsaved(&self) -> bool { self.unsaved }

    pub fn snapshot(&self) -> CartSnapshot { CartSnapshot { lines: self.cart.lines().to_vec() } }

    pub async fn add_item(&mut self, product: &CatalogProduct, quantity: u32) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        match next.add_item(product, quantity) {
            Ok(event) => self.commit(next, event).await,
            Err(e) => Err(self.reject(e)),
        }
    }

    pub async fn remove_item(&mut self, product_id: &str) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        match next.remove_item(product_id) {
            Some(event) => self.commit(next, event).await,
            None => Ok(()),
        }
    }

    pub async fn update_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        match next.update_quantity(product_id, quantity) {
            Ok(Some(event)) => self.commit(next, event).await,
            Ok(None) => Ok(()),
            Err(e) => Err(self.reject(e)),
        }
    }

    pub async fn clear(&mut self) -> Result<(), CartError> {
        let mut next = self.cart.clone();
        let event = next.clear();
        self.commit(next, event).await
    }

    /// Empties the cart once its order exists. The in-memory cart is emptied
    /// even when the save fails, so the same lines cannot be ordered twice;
    /// the save error is still returned and the store stays marked unsaved.
    pub async fn clear_after_order(&mut self) -> Result<(), CartError> {
        self.cart.clear();
        self.save_current().await
    }

    // Storage is written before the in-memory cart is swapped, so a failed
    // save leaves both sides on the previous state.
    async fn commit(&mut self, next: Cart, event: CartEvent) -> Result<(), CartError> {
        self.persistence.save(&self.key, &CartSnapshot { lines: next.lines().to_vec() }).await?;
        self.cart = next;
        self.unsaved = false;
        tracing::info!(cart = %self.key, ?event, items = self.cart.item_count(), "cart updated");
        if let Some(n) = Notification::for_event(&DomainEvent::Cart(event)) {
            self.notifier.notify(n);
        }
        Ok(())
    }

    async fn save_current(&mut self) -> Result<(), CartError> {
        match self.persistence.save(&self.key, &self.snapshot()).await {
            Ok(()) => { self.unsaved = false; Ok(()) }
            Err(e) => { self.unsaved = true; Err(e.into()) }
        }
    }

    fn reject(&self, error: CartError) -> CartError {
        tracing::warn!(cart = %self.key, %error, "cart change rejected");
        if let CartError::StockLimitExceeded { .. } = error {
            self.notifier.notify(Notification::destructive("Not enough stock", error.to_string()));
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::cart_store::{InMemoryCartPersistence, PersistenceError};
    use crate::notify::{ChannelNotifier, NotificationLevel};

    struct FailingPersistence;

    #[async_trait]
    impl CartPersistence for FailingPersistence {
        async fn load(&self, _key: &str) -> Result<Option<CartSnapshot>, PersistenceError> { Ok(None) }
        async fn save(&self, _key: &str, _snapshot: &CartSnapshot) -> Result<(), PersistenceError> {
            Err(PersistenceError::LockPoisoned("write"))
        }
    }

    fn product(id: &str, price: i64, stock: u32) -> CatalogProduct {
        CatalogProduct::new(id, format!("Toy {id}"), Decimal::new(price, 0), stock)
    }

    fn line(id: &str, quantity: u32, stock_ceiling: u32) -> CartLine {
        CartLine {
            product_id: id.into(), name: id.into(), unit_price: Decimal::ONE,
            image_ref: String::new(), quantity, stock_ceiling,
        }
    }

    #[tokio::test]
    async fn test_mutations_are_persisted_and_restored() {
        let persistence = Arc::new(InMemoryCartPersistence::new());
        let (notifier, _rx) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);

        let mut store = CartStore::open("s1", persistence.clone(), notifier.clone()).await.unwrap();
        store.add_item(&product("p1", 50, 10), 2).await.unwrap();
        store.add_item(&product("p2", 20, 3), 3).await.unwrap();
        store.update_quantity("p2", 1).await.unwrap();

        let restored = CartStore::open("s1", persistence, notifier).await.unwrap();
        assert_eq!(restored.lines(), store.lines());
        assert_eq!(restored.total(), Decimal::new(120, 0));
        assert_eq!(restored.item_count(), 3);
    }

    #[tokio::test]
    async fn test_open_writes_back_cleaned_cart() {
        let persistence = Arc::new(InMemoryCartPersistence::new());
        let stored = CartSnapshot { lines: vec![line("a", 1, 3), line("b", 0, 3), line("a", 2, 3)] };
        persistence.save("s1", &stored).await.unwrap();
        let (notifier, _rx) = ChannelNotifier::new();

        let store = CartStore::open("s1", persistence.clone(), Arc::new(notifier)).await.unwrap();
        assert_eq!(store.lines(), &[line("a", 1, 3)]);
        assert!(!store.is_unsaved());
        assert_eq!(persistence.load("s1").await.unwrap(), Some(store.snapshot()));
    }

    #[tokio::test]
    async fn test_notifications() {
        let persistence = Arc::new(InMemoryCartPersistence::new());
        let (notifier, mut rx) = ChannelNotifier::new();
        let mut store = CartStore::open("s1", persistence, Arc::new(notifier)).await.unwrap();

        store.add_item(&product("p1", 50, 1), 1).await.unwrap();
        assert_eq!(rx.try_recv().unwrap().description, "Toy p1 has been added to your cart.");

        assert!(store.add_item(&product("p1", 50, 1), 1).await.is_err());
        let n = rx.try_recv().unwrap();
        assert_eq!(n.level, NotificationLevel::Destructive);
        assert_eq!(n.description, "Only 1 items available for Toy p1.");

        store.remove_item("p1").await.unwrap();
        assert_eq!(rx.try_recv().unwrap().title, "Item removed");
        store.remove_item("p1").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_quantity_to_zero_is_silent() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let mut store = CartStore::open("s1", Arc::new(InMemoryCartPersistence::new()), Arc::new(notifier)).await.unwrap();
        store.add_item(&product("p1", 50, 4), 2).await.unwrap();
        let _ = rx.try_recv();

        store.update_quantity("p1", 0).await.unwrap();
        assert!(store.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let (notifier, _rx) = ChannelNotifier::new();
        let mut store = CartStore::open("s1", Arc::new(FailingPersistence), Arc::new(notifier)).await.unwrap();
        let err = store.add_item(&product("p1", 50, 5), 1).await.unwrap_err();
        assert!(matches!(err, CartError::Persistence(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clear_after_order_empties_even_when_save_fails() {
        let (notifier, _rx) = ChannelNotifier::new();
        let persistence = Arc::new(InMemoryCartPersistence::new());
        let mut store = CartStore::open("s1", persistence, Arc::new(notifier)).await.unwrap();
        store.add_item(&product("p1", 50, 5), 2).await.unwrap();
        store.persistence = Arc::new(FailingPersistence);

        assert!(matches!(store.clear_after_order().await, Err(CartError::Persistence(_))));
        assert!(store.is_empty());
        assert!(store.is_unsaved());
    }

    #[tokio::test]
    async fn test_store_usable_after_rejection() {
        let (notifier, _rx) = ChannelNotifier::new();
        let mut store = CartStore::open("s1", Arc::new(InMemoryCartPersistence::new()), Arc::new(notifier)).await.unwrap();
        let p = product("p1", 10, 5);
        assert!(store.add_item(&p, 6).await.is_err());
        store.add_item(&p, 5).await.unwrap();
        assert_eq!(store.item_count(), 5);
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}
