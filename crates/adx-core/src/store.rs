//! Blocked-List Store
//!
//! The persisted, ordered list of user-entered patterns. Every mutation is
//! validated first, applied to a copy, persisted, and only then committed in
//! memory, so a storage failure leaves the in-memory list untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{BlockerConfig, IdScheme};
use crate::pattern::{validate_pattern, ValidationError};
use crate::storage::{keys, load_value, save_value, KeyValueStore, StorageError};
use crate::types::{is_custom_rule_id, CUSTOM_RULE_ID_BASE};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Rule identifier space exhausted")]
    IdsExhausted,
}

/// One blocked pattern and the rule identifier assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedEntry {
    pub pattern: String,
    pub rule_id: i32,
}

// =============================================================================
// BlockedList
// =============================================================================

/// Ordered blocked patterns with their identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedList {
    entries: Vec<BlockedEntry>,
    next_rule_id: i32,
    id_scheme: IdScheme,
}

impl BlockedList {
    pub fn new(id_scheme: IdScheme) -> Self {
        Self {
            entries: Vec::new(),
            next_rule_id: CUSTOM_RULE_ID_BASE,
            id_scheme,
        }
    }

    /// Positional list built from bare patterns, `1000 + i` each.
    pub fn from_patterns<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut list = Self::new(IdScheme::Positional);
        list.entries = patterns
            .into_iter()
            .map(|p| BlockedEntry {
                pattern: p.into(),
                rule_id: 0,
            })
            .collect();
        list.renumber();
        list
    }

    /// Rebuild from persisted parts, repairing identifiers that are missing
    /// or inconsistent.
    pub fn restore(
        patterns: Vec<String>,
        rule_ids: Option<Vec<i32>>,
        next_rule_id: Option<i32>,
        id_scheme: IdScheme,
    ) -> Self {
        let mut list = Self::new(id_scheme);
        let ids = match (id_scheme, rule_ids) {
            (IdScheme::Stable, Some(ids)) if ids_are_usable(&ids, patterns.len()) => ids,
            (IdScheme::Stable, stored) => {
                if stored.is_some() || !patterns.is_empty() {
                    log::warn!(
                        "Assigning positional rule ids to {} stored patterns",
                        patterns.len()
                    );
                }
                positional_ids(patterns.len())
            }
            (IdScheme::Positional, _) => positional_ids(patterns.len()),
        };

        let max_id = ids.iter().copied().max().unwrap_or(CUSTOM_RULE_ID_BASE - 1);
        list.next_rule_id = next_rule_id
            .unwrap_or(CUSTOM_RULE_ID_BASE)
            .max(max_id.saturating_add(1))
            .max(CUSTOM_RULE_ID_BASE);
        list.entries = patterns
            .into_iter()
            .zip(ids)
            .map(|(pattern, rule_id)| BlockedEntry { pattern, rule_id })
            .collect();
        list
    }

    pub fn entries(&self) -> &[BlockedEntry] {
        &self.entries
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns().any(|p| p == pattern)
    }

    pub fn next_rule_id(&self) -> i32 {
        self.next_rule_id
    }

    pub fn id_scheme(&self) -> IdScheme {
        self.id_scheme
    }

    /// Append an already validated pattern.
    pub fn push(&mut self, pattern: String) -> Result<&BlockedEntry, StoreError> {
        let rule_id = match self.id_scheme {
            IdScheme::Stable => {
                let id = self.next_rule_id;
                self.next_rule_id = id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
                id
            }
            IdScheme::Positional => {
                let index = i32::try_from(self.entries.len()).map_err(|_| StoreError::IdsExhausted)?;
                CUSTOM_RULE_ID_BASE
                    .checked_add(index)
                    .ok_or(StoreError::IdsExhausted)?
            }
        };
        self.entries.push(BlockedEntry { pattern, rule_id });
        if self.id_scheme == IdScheme::Positional {
            self.next_rule_id = rule_id + 1;
        }
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Remove every exact match. Returns how many entries went away.
    pub fn remove(&mut self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.pattern != pattern);
        if self.id_scheme == IdScheme::Positional {
            self.renumber();
        }
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if self.id_scheme == IdScheme::Positional {
            self.next_rule_id = CUSTOM_RULE_ID_BASE;
        }
    }

    fn renumber(&mut self) {
        for (entry, id) in self.entries.iter_mut().zip(CUSTOM_RULE_ID_BASE..) {
            entry.rule_id = id;
        }
        self.next_rule_id = CUSTOM_RULE_ID_BASE.saturating_add(self.entries.len() as i32);
    }
}

fn positional_ids(len: usize) -> Vec<i32> {
    (CUSTOM_RULE_ID_BASE..).take(len).collect()
}

fn ids_are_usable(ids: &[i32], len: usize) -> bool {
    if ids.len() != len || !ids.iter().all(|&id| is_custom_rule_id(id)) {
        return false;
    }
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).all(|w| w[0] != w[1])
}

// =============================================================================
// BlockedListStore
// =============================================================================

/// The blocked list bound to its persistence.
pub struct BlockedListStore<S: KeyValueStore + ?Sized> {
    storage: Arc<S>,
    list: BlockedList,
    max_pattern_len: usize,
}

impl<S: KeyValueStore + ?Sized> BlockedListStore<S> {
    /// Read persisted state. Missing state is an empty list.
    pub async fn load(storage: Arc<S>, config: &BlockerConfig) -> Result<Self, StoreError> {
        let patterns: Vec<String> = load_value(&*storage, keys::BLOCKED_URLS)
            .await?
            .unwrap_or_default();
        let rule_ids: Option<Vec<i32>> = load_value(&*storage, keys::BLOCKED_RULE_IDS).await?;
        let next_rule_id: Option<i32> = load_value(&*storage, keys::NEXT_RULE_ID).await?;

        let list = BlockedList::restore(patterns, rule_ids, next_rule_id, config.id_scheme);
        log::debug!("Loaded {} blocked patterns", list.len());

        Ok(Self {
            storage,
            list,
            max_pattern_len: config.max_pattern_len,
        })
    }

    pub fn list(&self) -> &BlockedList {
        &self.list
    }

    pub fn entries(&self) -> &[BlockedEntry] {
        self.list.entries()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.list.patterns().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.list.contains(pattern)
    }

    /// Check a raw pattern without adding it. Returns the trimmed form.
    pub fn validate<'a>(&self, raw: &'a str) -> Result<&'a str, ValidationError> {
        validate_pattern(raw, self.list.patterns(), self.max_pattern_len)
    }

    /// Validate, append and persist. Returns the new entry.
    pub async fn add(&mut self, raw: &str) -> Result<BlockedEntry, StoreError> {
        let pattern = self.validate(raw)?.to_string();

        let mut next = self.list.clone();
        let entry = next.push(pattern)?.clone();
        self.commit(next).await?;
        Ok(entry)
    }

    /// Remove all exact matches and persist. Missing patterns are a no-op.
    pub async fn remove(&mut self, pattern: &str) -> Result<usize, StoreError> {
        let mut next = self.list.clone();
        let removed = next.remove(pattern);
        self.commit(next).await?;
        Ok(removed)
    }

    /// Empty the list and persist.
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        let mut next = self.list.clone();
        next.clear();
        self.commit(next).await
    }

    async fn commit(&mut self, next: BlockedList) -> Result<(), StoreError> {
        let patterns: Vec<&str> = next.patterns().collect();
        let ids: Vec<i32> = next.entries().iter().map(|e| e.rule_id).collect();

        save_value(&*self.storage, keys::BLOCKED_URLS, &patterns).await?;
        save_value(&*self.storage, keys::BLOCKED_RULE_IDS, &ids).await?;
        save_value(&*self.storage, keys::NEXT_RULE_ID, &next.next_rule_id()).await?;

        self.list = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn positional() -> BlockerConfig {
        BlockerConfig::default().with_id_scheme(IdScheme::Positional)
    }

    #[tokio::test]
    async fn load_empty_state() {
        let storage = Arc::new(MemoryStore::new());
        let store = BlockedListStore::load(storage, &BlockerConfig::default()).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.list().next_rule_id(), CUSTOM_RULE_ID_BASE);
    }

    #[tokio::test]
    async fn add_persists_in_order() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = BlockedListStore::load(storage.clone(), &BlockerConfig::default())
            .await
            .unwrap();

        store.add("example.com").await.unwrap();
        store.add(" https://ads.test/x ").await.unwrap();

        let stored: Vec<String> = load_value(&*storage, keys::BLOCKED_URLS).await.unwrap().unwrap();
        assert_eq!(stored, vec!["example.com", "https://ads.test/x"]);

        let reloaded = BlockedListStore::load(storage, &BlockerConfig::default()).await.unwrap();
        assert_eq!(reloaded.entries(), store.entries());
    }

    #[tokio::test]
    async fn duplicate_leaves_list_unchanged() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = BlockedListStore::load(storage, &BlockerConfig::default()).await.unwrap();
        store.add("example.com").await.unwrap();

        let err = store.add("example.com").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::Duplicate)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn empty_and_long_patterns_fail() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = BlockedListStore::load(storage, &BlockerConfig::default()).await.unwrap();

        let err = store.add("").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::EmptyPattern)));

        let long = "a".repeat(501);
        let err = store.add(&long).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::TooLong { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_missing_is_noop() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = BlockedListStore::load(storage, &BlockerConfig::default()).await.unwrap();
        store.add("example.com").await.unwrap();

        assert_eq!(store.remove("other.com").await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stable_ids_survive_removal() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = BlockedListStore::load(storage.clone(), &BlockerConfig::default())
            .await
            .unwrap();
        store.add("a.com").await.unwrap();
        store.add("b.com").await.unwrap();
        store.add("c.com").await.unwrap();
        store.remove("a.com").await.unwrap();

        let ids: Vec<i32> = store.entries().iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec![1001, 1002]);

        let entry = store.add("d.com").await.unwrap();
        assert_eq!(entry.rule_id, 1003);

        store.clear().await.unwrap();
        let entry = store.add("e.com").await.unwrap();
        assert_eq!(entry.rule_id, 1004);
    }

    #[tokio::test]
    async fn positional_ids_shift_on_removal() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = BlockedListStore::load(storage, &positional()).await.unwrap();
        store.add("a.com").await.unwrap();
        store.add("b.com").await.unwrap();
        store.remove("a.com").await.unwrap();

        assert_eq!(
            store.entries(),
            &[BlockedEntry {
                pattern: "b.com".to_string(),
                rule_id: 1000
            }]
        );
    }

    #[tokio::test]
    async fn legacy_state_gets_positional_ids() {
        let storage = Arc::new(MemoryStore::new());
        save_value(&*storage, keys::BLOCKED_URLS, &["a.com", "b.com"]).await.unwrap();
        save_value(&*storage, keys::NEXT_RULE_ID, &1000).await.unwrap();

        let mut store = BlockedListStore::load(storage, &BlockerConfig::default()).await.unwrap();
        let ids: Vec<i32> = store.entries().iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec![1000, 1001]);

        let entry = store.add("c.com").await.unwrap();
        assert_eq!(entry.rule_id, 1002);
    }

    #[test]
    fn restore_rejects_duplicate_ids() {
        let list = BlockedList::restore(
            vec!["a.com".to_string(), "b.com".to_string()],
            Some(vec![1005, 1005]),
            Some(1006),
            IdScheme::Stable,
        );
        let ids: Vec<i32> = list.entries().iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec![1000, 1001]);
        assert_eq!(list.next_rule_id(), 1006);
    }

    #[test]
    fn from_patterns_is_positional() {
        let list = BlockedList::from_patterns(["x.com", "y.com"]);
        let ids: Vec<i32> = list.entries().iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec![1000, 1001]);
        assert_eq!(list.id_scheme(), IdScheme::Positional);
    }
}
