//! Key-value persistence for cart snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::domain::aggregates::CartLine;

/// The whole cart as it is written to storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("invalid cart key `{0}`")]
    InvalidKey(String),
}

/// Session keys are 1 to 128 characters of `[A-Za-z0-9_-]`.
pub fn validate_key(key: &str) -> Result<(), PersistenceError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid { Ok(()) } else { Err(PersistenceError::InvalidKey(key.to_string())) }
}

/// Storage for cart snapshots, one per session key.
#[async_trait]
pub trait CartPersistence: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CartSnapshot>, PersistenceError>;
    async fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), PersistenceError>;
}

/// HashMap-backed persistence. Snapshots are kept as JSON so they go through
/// the same encoding as the file store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCartPersistence {
    storage: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCartPersistence {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl CartPersistence for InMemoryCartPersistence {
    async fn load(&self, key: &str) -> Result<Option<CartSnapshot>, PersistenceError> {
        validate_key(key)?;
        let storage = self.storage.read().map_err(|_| PersistenceError::LockPoisoned("read"))?;
        storage.get(key).map(|json| serde_json::from_str::<CartSnapshot>(json)).transpose().map_err(Into::into)
    }

    async fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), PersistenceError> {
        validate_key(key)?;
        let json = serde_json::to_string(snapshot)?;
        let mut storage = self.storage.write().map_err(|_| PersistenceError::LockPoisoned("write"))?;
        storage.insert(key.to_string(), json);
        Ok(())
    }
}

/// One `<key>.json` document per cart under a directory.
#[derive(Clone, Debug)]
pub struct JsonFileCartPersistence {
    dir: PathBuf,
}

impl JsonFileCartPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl CartPersistence for JsonFileCartPersistence {
    async fn load(&self, key: &str) -> Result<Option<CartSnapshot>, PersistenceError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn snapshot() -> CartSnapshot {
        CartSnapshot {
            lines: vec![
                CartLine { product_id: "p1".into(), name: "Salmon Bites".into(), unit_price: Decimal::new(4999, 2), image_ref: "a.jpg".into(), quantity: 2, stock_ceiling: 9 },
                CartLine { product_id: "p0".into(), name: "Yarn Ball".into(), unit_price: Decimal::new(150, 0), image_ref: String::new(), quantity: 1, stock_ceiling: 1 },
            ],
        }
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryCartPersistence::new();
        assert_eq!(store.load("s1").await.unwrap(), None);
        store.save("s1", &snapshot()).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), Some(snapshot()));
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCartPersistence::new(dir.path().join("carts")).unwrap();
        assert_eq!(store.load("session-1").await.unwrap(), None);
        store.save("session-1", &snapshot()).await.unwrap();

        let reopened = JsonFileCartPersistence::new(dir.path().join("carts")).unwrap();
        assert_eq!(reopened.load("session-1").await.unwrap(), Some(snapshot()));
    }

    #[tokio::test]
    async fn test_file_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCartPersistence::new(dir.path()).unwrap();
        assert!(matches!(store.save("../escape", &snapshot()).await, Err(PersistenceError::InvalidKey(_))));
        assert!(matches!(store.load("").await, Err(PersistenceError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_file_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCartPersistence::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        assert!(matches!(store.load("bad").await, Err(PersistenceError::Serde(_))));
    }

    #[tokio::test]
    async fn test_in_memory_rejects_bad_keys() {
        let store = InMemoryCartPersistence::new();
        assert!(matches!(store.save("a/b", &snapshot()).await, Err(PersistenceError::InvalidKey(_))));
        assert!(matches!(store.load(&"k".repeat(129)).await, Err(PersistenceError::InvalidKey(_))));
        store.save(&"k".repeat(128), &snapshot()).await.unwrap();
    }
}
