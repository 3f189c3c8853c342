//! Registry of open cart stores, one per session key.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::persistence::CartPersistence;
use super::store::CartStore;
use crate::domain::aggregates::CartError;
use crate::notify::NotificationSink;

pub type SharedCart = Arc<Mutex<CartStore>>;

/// Opens carts lazily from persistence and hands out the same store for
/// repeated requests on one session, so a session never has two mutators.
///
/// A store nobody holds and whose state is saved is dropped the next time a
/// session is opened; it is reloaded from persistence on its next request.
pub struct CartSessions {
    persistence: Arc<dyn CartPersistence>,
    notifier: Arc<dyn NotificationSink>,
    open: Mutex<HashMap<String, SharedCart>>,
}

impl CartSessions {
    pub fn new(persistence: Arc<dyn CartPersistence>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { persistence, notifier, open: Mutex::new(HashMap::new()) }
    }

    pub async fn session(&self, key: &str) -> Result<SharedCart, CartError> {
        let mut open = self.open.lock().await;
        if let Some(cart) = open.get(key) {
            return Ok(cart.clone());
        }
        open.retain(|_, cart| !Self::is_idle(cart));
        let store = CartStore::open(key, self.persistence.clone(), self.notifier.clone()).await?;
        let cart = Arc::new(Mutex::new(store));
        open.insert(key.to_string(), cart.clone());
        Ok(cart)
    }

    /// Number of stores currently held in memory.
    pub async fn open_count(&self) -> usize { self.open.lock().await.len() }

    fn is_idle(cart: &SharedCart) -> bool {
        Arc::strong_count(cart) == 1 && cart.try_lock().map_or(false, |c| !c.is_unsaved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart_store::InMemoryCartPersistence;
    use crate::domain::aggregates::CatalogProduct;
    use crate::notify::TracingNotifier;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_same_session_same_store() {
        let sessions = CartSessions::new(Arc::new(InMemoryCartPersistence::new()), Arc::new(TracingNotifier));
        let a = sessions.session("s1").await.unwrap();
        let b = sessions.session("s1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        a.lock().await.add_item(&CatalogProduct::new("p1", "Bed", Decimal::new(900, 0), 2), 1).await.unwrap();
        assert_eq!(b.lock().await.item_count(), 1);
        assert_eq!(sessions.session("s2").await.unwrap().lock().await.item_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted_and_reloaded() {
        let sessions = CartSessions::new(Arc::new(InMemoryCartPersistence::new()), Arc::new(TracingNotifier));
        {
            let cart = sessions.session("s1").await.unwrap();
            cart.lock().await.add_item(&CatalogProduct::new("p1", "Bed", Decimal::new(900, 0), 2), 2).await.unwrap();
        }
        let held = sessions.session("s2").await.unwrap();
        for i in 0..10 {
            sessions.session(&format!("visitor-{i}")).await.unwrap();
        }
        assert_eq!(sessions.open_count().await, 2);

        assert_eq!(sessions.session("s1").await.unwrap().lock().await.item_count(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn test_invalid_session_key() {
        let sessions = CartSessions::new(Arc::new(InMemoryCartPersistence::new()), Arc::new(TracingNotifier));
        assert!(matches!(
            sessions.session("../../etc").await,
            Err(CartError::Persistence(crate::cart_store::PersistenceError::InvalidKey(_)))
        ));
        assert_eq!(sessions.open_count().await, 0);
    }
}
