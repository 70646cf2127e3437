//! Custom blocker
//!
//! Ties the blocked-list store to the rule engine. Every mutation is
//! persisted first, then the whole custom rule set is recompiled and
//! synchronized, and the rest of the extension is told about the new list.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use adx_core::config::BlockerConfig;
use adx_core::entitlement::{EntitlementError, EntitlementGate, PremiumFeature};
use adx_core::pattern::ValidationError;
use adx_core::storage::{KeyValueStore, StorageError};
use adx_core::store::{BlockedEntry, BlockedListStore, StoreError};
use adx_core::types::CompiledRule;

use crate::compiler::compile;
use crate::sync::{EngineError, RuleEngine, SyncReport, Synchronizer};

#[derive(Debug, thiserror::Error)]
pub enum BlockerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Entitlement(#[from] EntitlementError),
}

impl From<StoreError> for BlockerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => Self::Validation(e),
            StoreError::Storage(e) => Self::Storage(e),
            other => Self::Store(other),
        }
    }
}

/// Messages broadcast to other extension contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum BlockerEvent {
    #[serde(rename = "updateCustomRules")]
    BlockedListChanged {
        #[serde(rename = "blockedUrls")]
        patterns: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("Notification not delivered: {0}")]
pub struct NotifyError(pub String);

/// Messaging port. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BlockerEvent) -> Result<(), NotifyError>;
}

/// Notifier for hosts with nobody listening.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &BlockerEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub struct CustomBlocker<S, E, N>
where
    S: KeyValueStore + ?Sized,
    E: RuleEngine + ?Sized,
    N: Notifier + ?Sized,
{
    store: BlockedListStore<S>,
    synchronizer: Synchronizer<E>,
    notifier: Arc<N>,
    gate: EntitlementGate<S>,
    config: BlockerConfig,
}

impl<S, E, N> CustomBlocker<S, E, N>
where
    S: KeyValueStore + ?Sized,
    E: RuleEngine + ?Sized,
    N: Notifier + ?Sized,
{
    /// Load the persisted list. Nothing is synchronized until the first
    /// mutation or [`resync`](Self::resync).
    pub async fn open(
        storage: Arc<S>,
        engine: Arc<E>,
        notifier: Arc<N>,
        config: BlockerConfig,
    ) -> Result<Self, BlockerError> {
        let store = BlockedListStore::load(storage.clone(), &config).await?;
        Ok(Self {
            store,
            synchronizer: Synchronizer::new(engine),
            notifier,
            gate: EntitlementGate::new(storage),
            config,
        })
    }

    pub fn store(&self) -> &BlockedListStore<S> {
        &self.store
    }

    pub fn config(&self) -> &BlockerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<E> {
        self.synchronizer.engine()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.store.patterns()
    }

    /// The rule set the current list compiles to.
    pub fn compiled_rules(&self) -> Vec<CompiledRule> {
        compile(self.store.list())
    }

    /// Validate and append a pattern, then synchronize.
    ///
    /// A failed sync leaves the pattern persisted; [`resync`](Self::resync)
    /// installs it later.
    pub async fn add(&mut self, raw: &str) -> Result<BlockedEntry, BlockerError> {
        if self.config.require_premium {
            self.gate.require(PremiumFeature::CustomBlock).await?;
        }

        let entry = self.store.add(raw).await?;
        log::info!("Blocked pattern added: {} (rule {})", entry.pattern, entry.rule_id);
        self.apply().await?;
        Ok(entry)
    }

    /// Remove every exact match of `pattern`, then synchronize.
    pub async fn remove(&mut self, pattern: &str) -> Result<usize, BlockerError> {
        let removed = self.store.remove(pattern).await?;
        if removed == 0 {
            log::debug!("Pattern not in blocked list: {}", pattern);
        }
        self.apply().await?;
        Ok(removed)
    }

    pub async fn clear(&mut self) -> Result<(), BlockerError> {
        self.store.clear().await?;
        self.apply().await?;
        Ok(())
    }

    /// Synchronize the current list without changing it.
    pub async fn resync(&self) -> Result<SyncReport, BlockerError> {
        self.apply().await
    }

    async fn apply(&self) -> Result<SyncReport, BlockerError> {
        let report = self.synchronizer.sync(&self.compiled_rules()).await?;

        let event = BlockerEvent::BlockedListChanged {
            patterns: self.store.patterns(),
        };
        if let Err(e) = self.notifier.notify(&event).await {
            log::debug!("{}", e);
        }
        Ok(report)
    }
}
