//! Dynamic rule synchronizer
//!
//! Replace-all reconciliation: every installed rule in the custom range is
//! removed and the freshly compiled set is added. Rules below the custom
//! range belong to the extension's static sets and are never touched.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use adx_core::types::{CompiledRule, InstalledRule};

/// Rejection reported by the host rule engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Rule {id} has a malformed filter: {reason}")]
    MalformedFilter { id: i32, reason: String },
    #[error("Dynamic rule quota exceeded ({requested} > {limit})")]
    QuotaExceeded { limit: usize, requested: usize },
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Rule id {0} is already installed")]
    DuplicateId(i32),
    #[error("Rule engine error: {0}")]
    Host(String),
}

/// One `updateDynamicRules` call: removals are applied before additions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_rule_ids: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_rules: Vec<CompiledRule>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.remove_rule_ids.is_empty() && self.add_rules.is_empty()
    }
}

/// What a successful sync did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub removed: usize,
    pub added: usize,
}

/// Host rule engine port.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Currently installed dynamic rules.
    async fn installed_rules(&self) -> Result<Vec<InstalledRule>, EngineError>;

    /// Apply one delta. The host applies a delta atomically: on error
    /// nothing changed.
    async fn apply_delta(&self, delta: &SyncPlan) -> Result<(), EngineError>;
}

/// Build the replace-all plan: remove every installed custom rule, add all
/// of `compiled`.
pub fn plan(compiled: &[CompiledRule], installed: &[InstalledRule]) -> SyncPlan {
    let mut remove_rule_ids: Vec<i32> = Vec::new();
    for rule in installed.iter().filter(|r| r.is_custom()) {
        if !remove_rule_ids.contains(&rule.id) {
            remove_rule_ids.push(rule.id);
        }
    }

    SyncPlan {
        remove_rule_ids,
        add_rules: compiled.to_vec(),
    }
}

/// Runs plans against a rule engine.
pub struct Synchronizer<E: RuleEngine + ?Sized> {
    engine: Arc<E>,
}

impl<E: RuleEngine + ?Sized> Synchronizer<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Read the installed set, plan, and execute.
    pub async fn sync(&self, compiled: &[CompiledRule]) -> Result<SyncReport, EngineError> {
        let installed = self.engine.installed_rules().await?;
        let plan = plan(compiled, &installed);
        log::debug!(
            "Sync plan: remove {} custom rules, add {} ({} installed)",
            plan.remove_rule_ids.len(),
            plan.add_rules.len(),
            installed.len()
        );
        self.execute(&plan).await
    }

    /// Submit the plan as one delta. The host applies removals before
    /// additions and rejects the call as a whole, so a failed sync leaves
    /// the installed rules as they were.
    pub async fn execute(&self, plan: &SyncPlan) -> Result<SyncReport, EngineError> {
        if plan.is_empty() {
            return Ok(SyncReport::default());
        }

        self.engine
            .apply_delta(plan)
            .await
            .inspect_err(|e| log::error!("Updating custom rules failed: {}", e))?;

        let report = SyncReport {
            removed: plan.remove_rule_ids.len(),
            added: plan.add_rules.len(),
        };
        log::info!("Updated {} custom blocking rules", report.added);
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingEngine;
    use super::*;
    use crate::compiler::compile_patterns;

    fn installed(ids: &[i32]) -> Vec<InstalledRule> {
        ids.iter()
            .map(|&id| InstalledRule {
                id,
                condition: Default::default(),
            })
            .collect()
    }

    #[test]
    fn plan_removes_only_custom_range() {
        let compiled = compile_patterns(&["a.com"]);
        let plan = plan(&compiled, &installed(&[1, 999, 1000, 1001, 4000]));
        assert_eq!(plan.remove_rule_ids, vec![1000, 1001, 4000]);
        assert_eq!(plan.add_rules, compiled);
    }

    #[test]
    fn plan_with_nothing_installed() {
        let plan = plan(&[], &installed(&[5, 6]));
        assert!(plan.is_empty());
    }

    #[test]
    fn plan_serializes_as_update_options() {
        let plan = plan(&compile_patterns(&["a.com"]), &installed(&[1000]));
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["removeRuleIds"], serde_json::json!([1000]));
        assert_eq!(json["addRules"][0]["condition"]["urlFilter"], "*a.com*");
    }

    #[tokio::test]
    async fn sync_submits_one_delta() {
        let engine = Arc::new(RecordingEngine::with_installed(&[7, 1000, 1001]));
        let sync = Synchronizer::new(engine.clone());

        let report = sync.sync(&compile_patterns(&["a.com"])).await.unwrap();
        assert_eq!(report, SyncReport { removed: 2, added: 1 });

        let deltas = engine.deltas.lock().unwrap().clone();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].remove_rule_ids, vec![1000, 1001]);
        assert_eq!(deltas[0].add_rules.len(), 1);

        assert_eq!(engine.installed_ids(), vec![7, 1000]);
        assert_eq!(engine.installed_filters(), vec![(1000, "*a.com*".to_string())]);
    }

    #[tokio::test]
    async fn failed_removal_adds_nothing() {
        let engine = Arc::new(RecordingEngine::with_installed(&[1000]));
        *engine.fail_remove.lock().unwrap() = Some(EngineError::PermissionDenied("no".into()));
        let sync = Synchronizer::new(engine.clone());

        let err = sync.sync(&compile_patterns(&["a.com", "b.com"])).await.unwrap_err();
        assert_eq!(err, EngineError::PermissionDenied("no".into()));
        assert_eq!(engine.installed_ids(), vec![1000]);
    }

    #[tokio::test]
    async fn rejected_additions_keep_installed_rules() {
        let engine = Arc::new(RecordingEngine::default());
        let sync = Synchronizer::new(engine.clone());
        sync.sync(&compile_patterns(&["a.com"])).await.unwrap();

        *engine.fail_add.lock().unwrap() = Some(EngineError::MalformedFilter {
            id: 1001,
            reason: "bad".into(),
        });
        let err = sync.sync(&compile_patterns(&["a.com", "b.com"])).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedFilter { id: 1001, .. }));
        assert_eq!(engine.installed_filters(), vec![(1000, "*a.com*".to_string())]);
    }

    #[tokio::test]
    async fn empty_list_only_removes() {
        let engine = Arc::new(RecordingEngine::with_installed(&[3, 1000]));
        let sync = Synchronizer::new(engine.clone());

        let report = sync.sync(&[]).await.unwrap();
        assert_eq!(report, SyncReport { removed: 1, added: 0 });
        let deltas = engine.deltas.lock().unwrap().clone();
        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].add_rules.is_empty());
        assert_eq!(engine.installed_ids(), vec![3]);
    }

    #[tokio::test]
    async fn nothing_to_do_sends_nothing() {
        let engine = Arc::new(RecordingEngine::default());
        let sync = Synchronizer::new(engine.clone());
        assert_eq!(sync.sync(&[]).await.unwrap(), SyncReport::default());
        assert!(engine.deltas.lock().unwrap().is_empty());
    }
}
