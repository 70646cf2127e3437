//! AdXGuard Rule Compiler
//!
//! This crate compiles the blocked list into host dynamic rules and keeps
//! the installed custom rule set in step with it.

pub mod blocker;
pub mod compiler;
pub mod sync;

pub use blocker::{BlockerError, BlockerEvent, CustomBlocker, NoopNotifier, Notifier, NotifyError};
pub use compiler::{compile, compile_patterns, normalize_filter};
pub use sync::{plan, EngineError, RuleEngine, SyncPlan, SyncReport, Synchronizer};
