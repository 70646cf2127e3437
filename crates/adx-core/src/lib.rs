//! AdXGuard Core Library
//!
//! Data model and persistence-facing pieces of the custom URL blocking
//! feature. Everything that talks to the extension host goes through the
//! async [`storage::KeyValueStore`] port; the rule compiler and the
//! synchronizer live in `adx-compiler`.
//!
//! # Modules
//!
//! - `types`: host rule JSON types and identifier constants
//! - `url`: allocation-free URL helpers
//! - `pattern`: blocked pattern validation
//! - `filter`: `urlFilter` evaluation against sample URLs
//! - `storage`: key-value persistence port and in-memory store
//! - `store`: the persisted Blocked-List Store
//! - `stats`: monthly block statistics
//! - `entitlement`: premium feature gate
//! - `config`: blocker configuration

pub mod config;
pub mod entitlement;
pub mod filter;
pub mod pattern;
pub mod stats;
pub mod storage;
pub mod store;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use config::{BlockerConfig, IdScheme};
pub use entitlement::{EntitlementError, EntitlementGate, PremiumFeature};
pub use filter::UrlFilter;
pub use pattern::{validate_pattern, ValidationError};
pub use stats::{BlockStats, StatsTracker};
pub use storage::{KeyValueStore, MemoryStore, StorageError};
pub use store::{BlockedEntry, BlockedList, BlockedListStore, StoreError};
pub use types::{CompiledRule, InstalledRule, ResourceType, CUSTOM_RULE_ID_BASE};
