//! Key-value persistence port
//!
//! The extension host owns persistence. Everything in this crate reaches it
//! through [`KeyValueStore`], which mirrors the host's async get/set over
//! JSON values.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Storage keys shared with the extension's JavaScript.
pub mod keys {
    /// Ordered list of blocked patterns.
    pub const BLOCKED_URLS: &str = "customBlockedUrls";
    /// Rule identifiers parallel to `customBlockedUrls`.
    pub const BLOCKED_RULE_IDS: &str = "customBlockedRuleIds";
    /// Next identifier to hand out.
    pub const NEXT_RULE_ID: &str = "nextCustomRuleId";
    /// Block statistics object.
    pub const STATS: &str = "stats";
    /// Global blocking toggle.
    pub const AD_BLOCKER_ENABLED: &str = "adBlockerEnabled";
    pub const IS_PREMIUM: &str = "isPremium";
    pub const PREMIUM_PURCHASE_DATE: &str = "premiumPurchaseDate";
    pub const PAYMENT_METHOD: &str = "paymentMethod";
    pub const PAYMENT_SESSION_ID: &str = "paymentSessionId";
    pub const PAYMENT_VERIFIED: &str = "paymentVerified";
}

/// Error type for persistence access.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored value has unexpected shape: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Async key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key. Missing keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a key.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and deserialize a key.
pub async fn load_value<S, T>(store: &S, key: &str) -> Result<Option<T>, StorageError>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(Value::Null) | None => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Serialize and write a key.
pub async fn save_value<S, T>(store: &S, key: &str, value: &T) -> Result<(), StorageError>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    store.set(key, serde_json::to_value(value)?).await
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store. Used by tests and by hosts that persist the map
/// themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing values.
    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }

    /// Copy of everything currently stored.
    pub fn snapshot(&self) -> Result<HashMap<String, Value>, StorageError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, StorageError> {
        self.values
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
