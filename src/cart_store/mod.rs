//! Session cart state and its persistence.
pub mod persistence;
pub mod sessions;
pub mod store;

pub use persistence::{CartPersistence, CartSnapshot, InMemoryCartPersistence, JsonFileCartPersistence, PersistenceError};
pub use sessions::{CartSessions, SharedCart};
pub use store::CartStore;
