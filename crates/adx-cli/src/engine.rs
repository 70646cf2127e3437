//! File-backed dynamic rule engine.
//!
//! Holds the installed dynamic rules as a JSON array and checks deltas the
//! way the browser does before accepting them. A rejected delta leaves the
//! file untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use adx_compiler::{EngineError, RuleEngine, SyncPlan};
use adx_core::types::{CompiledRule, InstalledRule};

use crate::state::write_atomic;

pub struct JsonFileEngine {
    path: PathBuf,
    quota: usize,
    lock: Mutex<()>,
}

impl JsonFileEngine {
    pub fn new(path: impl Into<PathBuf>, quota: usize) -> Self {
        Self {
            path: path.into(),
            quota,
            lock: Mutex::new(()),
        }
    }

    /// Raw rule objects. Rules not written by this crate keep every field
    /// they were seeded with.
    async fn load(&self) -> Result<Vec<Value>, EngineError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(host_error("read", &self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text)
            .map_err(|e| EngineError::Host(format!("Installed rules are unreadable: {}", e)))
    }

    async fn store(&self, rules: &[Value]) -> Result<(), EngineError> {
        let text = serde_json::to_string_pretty(rules)
            .map_err(|e| EngineError::Host(e.to_string()))?;
        write_atomic(&self.path, text.as_bytes())
            .await
            .map_err(|e| host_error("write", &self.path, e))
    }

    fn check_additions(&self, remaining: &[InstalledRule], add: &[CompiledRule]) -> Result<(), EngineError> {
        let requested = remaining.len() + add.len();
        if requested > self.quota {
            return Err(EngineError::QuotaExceeded {
                limit: self.quota,
                requested,
            });
        }

        let mut ids: HashSet<i32> = remaining.iter().map(|r| r.id).collect();
        for rule in add {
            if rule.id < 1 {
                return Err(EngineError::Host(format!("Rule id {} must be at least 1", rule.id)));
            }
            if !ids.insert(rule.id) {
                return Err(EngineError::DuplicateId(rule.id));
            }
            check_filter(rule)?;
        }
        Ok(())
    }
}

fn check_filter(rule: &CompiledRule) -> Result<(), EngineError> {
    let filter = rule.url_filter();
    let reason = if filter.is_empty() {
        "urlFilter must not be empty"
    } else if !filter.is_ascii() {
        "urlFilter must only contain ASCII characters"
    } else if filter.starts_with("||*") {
        "urlFilter must not start with '||*'"
    } else {
        return Ok(());
    };
    Err(EngineError::MalformedFilter {
        id: rule.id,
        reason: reason.to_string(),
    })
}

fn parse_rule(value: &Value) -> Result<InstalledRule, EngineError> {
    serde_json::from_value(value.clone())
        .map_err(|e| EngineError::Host(format!("Installed rule is unreadable: {}", e)))
}

fn host_error(op: &str, path: &Path, err: std::io::Error) -> EngineError {
    EngineError::Host(format!("Failed to {} '{}': {}", op, path.display(), err))
}

#[async_trait]
impl RuleEngine for JsonFileEngine {
    async fn installed_rules(&self) -> Result<Vec<InstalledRule>, EngineError> {
        let _guard = self.lock.lock().await;
        self.load().await?.iter().map(parse_rule).collect()
    }

    async fn apply_delta(&self, delta: &SyncPlan) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;

        let mut kept = Vec::new();
        let mut remaining = Vec::new();
        for value in self.load().await? {
            let rule = parse_rule(&value)?;
            if !delta.remove_rule_ids.contains(&rule.id) {
                kept.push(value);
                remaining.push(rule);
            }
        }

        self.check_additions(&remaining, &delta.add_rules)?;
        for rule in &delta.add_rules {
            kept.push(serde_json::to_value(rule).map_err(|e| EngineError::Host(e.to_string()))?);
        }

        self.store(&kept).await?;
        log::debug!(
            "Applied delta: -{} +{} ({} installed)",
            delta.remove_rule_ids.len(),
            delta.add_rules.len(),
            kept.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::state::{scratch_path, JsonFileStore};
    use adx_compiler::{compile_patterns, BlockerError, CustomBlocker, NoopNotifier};
    use adx_core::config::BlockerConfig;
    use adx_core::pattern::{validate_pattern_default, ValidationError};

    fn adding(rules: Vec<CompiledRule>) -> SyncPlan {
        SyncPlan {
            remove_rule_ids: Vec::new(),
            add_rules: rules,
        }
    }

    #[tokio::test]
    async fn keeps_seeded_rules_verbatim() {
        let path = scratch_path("seeded");
        std::fs::write(
            &path,
            r#"[{"id":1,"priority":1,"action":{"type":"allow"},"condition":{"urlFilter":"||ok.test^"}}]"#,
        )
        .unwrap();
        let engine = JsonFileEngine::new(&path, 5000);

        engine.apply_delta(&adding(compile_patterns(&["a.com"]))).await.unwrap();

        let raw: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["action"]["type"], "allow");
        let ids: Vec<i32> = engine.installed_rules().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 1000]);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let path = scratch_path("dup");
        let engine = JsonFileEngine::new(&path, 5000);
        engine.apply_delta(&adding(compile_patterns(&["a.com"]))).await.unwrap();

        let err = engine
            .apply_delta(&adding(compile_patterns(&["b.com"])))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::DuplicateId(1000));
        assert_eq!(engine.installed_rules().await.unwrap().len(), 1);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn rejects_over_quota() {
        let engine = JsonFileEngine::new(scratch_path("quota"), 1);
        let err = engine
            .apply_delta(&adding(compile_patterns(&["a.com", "b.com"])))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::QuotaExceeded { limit: 1, requested: 2 });
    }

    #[tokio::test]
    async fn rejects_non_ascii_filters() {
        let engine = JsonFileEngine::new(scratch_path("ascii"), 5000);
        let err = engine
            .apply_delta(&adding(compile_patterns(&["bücher.de"])))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedFilter { id: 1000, .. }));
    }

    #[tokio::test]
    async fn removal_then_addition_reuses_ids() {
        let path = scratch_path("reuse");
        let engine = JsonFileEngine::new(&path, 5000);
        engine.apply_delta(&adding(compile_patterns(&["a.com"]))).await.unwrap();

        engine
            .apply_delta(&SyncPlan {
                remove_rule_ids: vec![1000],
                add_rules: Vec::new(),
            })
            .await
            .unwrap();
        engine.apply_delta(&adding(compile_patterns(&["b.com"]))).await.unwrap();

        let rules = engine.installed_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition.url_filter.as_deref(), Some("*b.com*"));

        let _ = std::fs::remove_file(path);
    }

    async fn open_blocker(
        tag: &str,
        quota: usize,
    ) -> CustomBlocker<JsonFileStore, JsonFileEngine, NoopNotifier> {
        CustomBlocker::open(
            Arc::new(JsonFileStore::new(scratch_path(&format!("{tag}-state")))),
            Arc::new(JsonFileEngine::new(scratch_path(&format!("{tag}-rules")), quota)),
            Arc::new(NoopNotifier),
            BlockerConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn accepted_patterns_install() {
        let engine = JsonFileEngine::new(scratch_path("accepted"), 5000);
        let mut accepted: Vec<String> = Vec::new();
        for raw in [
            "example.com",
            "https://ads.test/x",
            "*.doubleclick.net",
            "https://*.ads.test/*",
            "xn--bcher-kva.de",
            "bücher.de",
            "https://bücher.de/",
            "||*.ads.com",
            "ads .com",
        ] {
            if let Ok(pattern) = validate_pattern_default(raw, accepted.iter().map(String::as_str)) {
                accepted.push(pattern.to_string());
            }
        }
        assert_eq!(accepted.len(), 5);

        engine.apply_delta(&adding(compile_patterns(&accepted[..]))).await.unwrap();
        assert_eq!(engine.installed_rules().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn non_ascii_pattern_never_reaches_engine() {
        let mut blocker = open_blocker("idn", 5000).await;
        blocker.add("a.com").await.unwrap();

        let err = blocker.add("bücher.de").await.unwrap_err();
        assert!(matches!(err, BlockerError::Validation(ValidationError::InvalidFormat)));
        assert_eq!(blocker.patterns(), vec!["a.com"]);

        blocker.add("c.com").await.unwrap();
        let ids: Vec<i32> = blocker
            .engine()
            .installed_rules()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1000, 1001]);
    }

    #[tokio::test]
    async fn rejected_sync_keeps_installed_rules() {
        let mut blocker = open_blocker("atomic", 1).await;
        blocker.add("a.com").await.unwrap();

        let err = blocker.add("b.com").await.unwrap_err();
        assert!(matches!(
            err,
            BlockerError::Engine(EngineError::QuotaExceeded { limit: 1, requested: 2 })
        ));

        let installed = blocker.engine().installed_rules().await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].id, 1000);
        assert_eq!(installed[0].condition.url_filter.as_deref(), Some("*a.com*"));
    }
}
