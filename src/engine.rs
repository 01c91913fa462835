//! The apply engine: one config load from type registration to commit.
//!
//! ```text
//! startup ──▶ add_rule* ──▶ run_apply_pass ──▶ check_matches ──▶ commit
//! ```
//!
//! Rules can only be added while no apply pass is running; the pass shares
//! the frozen store with its workers.

use std::sync::Arc;

use tracing::info;

use crate::apply::{
    builtin_kinds, register_kinds, ApplyKind, ApplyPass, ApplyPassConfig, ApplyPassSummary, ApplyRule,
    ApplyRuleStore, RuleDefinition, RuleId,
};
use crate::config::{CommitPipeline, CommitSummary, ItemRegistry};
use crate::error::{ApplyError, ApplyResult, ConfigError};
use crate::ipc::ConfigObjectsLock;
use crate::loader::DeferredInitializers;
use crate::objects::Checkable;

/// Apply engine.
pub struct ApplyEngine {
    store: Arc<ApplyRuleStore>,
    kinds: Vec<Arc<dyn ApplyKind>>,
    registry: Arc<ItemRegistry>,
    initializers: DeferredInitializers<ApplyRuleStore>,
}

impl Default for ApplyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplyEngine {
    /// Creates an engine with the built-in kinds, whose type registrations
    /// are queued for [`startup`](Self::startup).
    #[must_use]
    pub fn new() -> Self {
        Self::with_kinds(builtin_kinds())
    }

    /// Creates an engine for `kinds`.
    #[must_use]
    pub fn with_kinds(kinds: Vec<Arc<dyn ApplyKind>>) -> Self {
        let mut initializers = DeferredInitializers::new();
        register_kinds(&mut initializers, &kinds);

        Self {
            store: Arc::new(ApplyRuleStore::new()),
            kinds,
            registry: Arc::new(ItemRegistry::new()),
            initializers,
        }
    }

    /// Queue of work to run against the rule store at startup.
    pub fn initializers_mut(&mut self) -> &mut DeferredInitializers<ApplyRuleStore> {
        &mut self.initializers
    }

    /// Runs the queued initializers. Call once every component had the
    /// chance to queue its work, before adding rules.
    ///
    /// # Errors
    /// Returns an internal error if an apply pass still holds the store.
    pub fn startup(&mut self) -> ApplyResult<usize> {
        let store = Arc::get_mut(&mut self.store).ok_or_else(|| ApplyError::internal("rule store is frozen"))?;
        let ran = self.initializers.run_all(store);
        info!(initializers = ran, "Ran deferred initializers");
        Ok(ran)
    }

    /// Rule store.
    #[must_use]
    pub fn store(&self) -> &ApplyRuleStore {
        &self.store
    }

    /// Items created by apply passes and not yet committed.
    #[must_use]
    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    /// Adds a rule to the store.
    ///
    /// # Errors
    /// Returns a configuration error for unknown source types or invalid
    /// target types.
    pub fn add_rule(
        &mut self,
        source_type: &str,
        target_type: &str,
        definition: RuleDefinition,
    ) -> ApplyResult<RuleId> {
        let store = Arc::get_mut(&mut self.store).ok_or_else(|| ApplyError::internal("rule store is frozen"))?;
        Ok(store.add_rule(source_type, target_type, definition)?)
    }

    /// Evaluates all rules against `targets`, registering the created items.
    ///
    /// # Errors
    /// Returns the first configuration error raised while expanding.
    pub fn run_apply_pass(
        &self,
        targets: impl IntoIterator<Item = Checkable>,
        config: ApplyPassConfig,
    ) -> Result<ApplyPassSummary, ConfigError> {
        ApplyPass::new(
            Arc::clone(&self.store),
            self.kinds.clone(),
            Arc::clone(&self.registry),
            config,
        )
        .run(targets)
    }

    /// Rules that never matched; each is also logged unless `silent`.
    pub fn check_matches(&self, silent: bool) -> Vec<&ApplyRule> {
        self.store.check_matches(silent)
    }

    /// Commits every registered item through `pipeline` while holding `lock`
    /// exclusively.
    ///
    /// # Errors
    /// See [`CommitPipeline::commit`].
    pub fn commit(&self, pipeline: &CommitPipeline, lock: &ConfigObjectsLock) -> ApplyResult<CommitSummary> {
        pipeline.commit(lock, &self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::objects::Host;

    #[test]
    fn test_rules_need_startup() {
        let mut engine = ApplyEngine::new();
        let rule = RuleDefinition::new("d", Expression::Block(Vec::new()), Expression::literal(true));

        let err = engine.add_rule("Dependency", "Host", rule.clone()).unwrap_err();
        assert!(err.is_config());

        assert_eq!(engine.startup().unwrap(), 2);
        engine.add_rule("Dependency", "Host", rule).unwrap();
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_queued_initializers_run_at_startup() {
        let mut engine = ApplyEngine::new();
        engine.initializers_mut().add(crate::loader::PRIORITY_DEFAULT, |store| {
            store.register_type("Notification", ["Host", "Service"]);
        });

        let rule = RuleDefinition::new("mail", Expression::Block(Vec::new()), Expression::literal(true));
        assert!(engine.add_rule("Notification", "Host", rule.clone()).is_err());

        assert_eq!(engine.startup().unwrap(), 3);
        assert!(engine.store().is_valid_target_type("Notification", "Service"));
        engine.add_rule("Notification", "Host", rule).unwrap();
    }

    #[test]
    fn test_pass_then_more_rules() {
        let mut engine = ApplyEngine::new();
        engine.startup().unwrap();
        engine
            .add_rule(
                "Dependency",
                "Host",
                RuleDefinition::new("d", Expression::Block(Vec::new()), Expression::literal(true)),
            )
            .unwrap();

        let summary = engine
            .run_apply_pass(vec![Checkable::from(Host::new("h1"))], ApplyPassConfig::default())
            .unwrap();
        assert_eq!(summary.instances, 1);
        assert!(engine.check_matches(true).is_empty());

        // The pass released the store.
        engine
            .add_rule(
                "Service",
                "",
                RuleDefinition::new("ping", Expression::Block(Vec::new()), Expression::literal(false)),
            )
            .unwrap();
        assert_eq!(engine.check_matches(true).len(), 1);
    }
}
