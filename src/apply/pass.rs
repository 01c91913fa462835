//! Parallel evaluation of apply rules over all hosts and services.
//!
//! The rule store is frozen behind an `Arc` while the pass runs. Targets are
//! fed through a bounded channel to a fixed set of worker threads, each of
//! which runs every kind's rules against the targets it receives and
//! registers the resulting items concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use tracing::{info, info_span};

use crate::config::ItemRegistry;
use crate::error::ConfigError;
use crate::objects::Checkable;

use super::expander::{ExpandStats, TemplateExpander};
use super::kind::ApplyKind;
use super::store::ApplyRuleStore;

/// Apply pass configuration.
#[derive(Debug, Clone)]
pub struct ApplyPassConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued targets.
    pub queue_capacity: usize,
    /// Log and count `for` terms that fail to evaluate.
    pub report_for_term_errors: bool,
}

impl Default for ApplyPassConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(2, usize::from),
            queue_capacity: 1024,
            report_for_term_errors: false,
        }
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyPassSummary {
    /// Hosts and services evaluated.
    pub targets: usize,
    /// Config items registered.
    pub instances: usize,
    /// Failing `for` terms, if reporting was enabled.
    pub for_term_errors: usize,
}

impl ApplyPassSummary {
    fn merge(&mut self, other: Self) {
        self.targets += other.targets;
        self.instances += other.instances;
        self.for_term_errors += other.for_term_errors;
    }
}

/// One apply pass over a frozen rule store.
pub struct ApplyPass {
    store: Arc<ApplyRuleStore>,
    kinds: Vec<Arc<dyn ApplyKind>>,
    registry: Arc<ItemRegistry>,
    config: ApplyPassConfig,
}

impl ApplyPass {
    /// Creates a pass over a frozen rule store.
    #[must_use]
    pub fn new(
        store: Arc<ApplyRuleStore>,
        kinds: Vec<Arc<dyn ApplyKind>>,
        registry: Arc<ItemRegistry>,
        config: ApplyPassConfig,
    ) -> Self {
        Self {
            store,
            kinds,
            registry,
            config,
        }
    }

    /// Evaluates the rules of every kind against every target.
    ///
    /// # Errors
    /// Returns the first configuration error raised by a worker. Remaining
    /// targets are skipped once an error occurred; items registered before
    /// that stay in the registry.
    ///
    /// # Panics
    /// Panics if a worker thread cannot be spawned, and re-raises a worker's
    /// panic.
    pub fn run(&self, targets: impl IntoIterator<Item = Checkable>) -> Result<ApplyPassSummary, ConfigError> {
        let workers = self.config.workers.max(1);
        let queue_capacity = self.config.queue_capacity.max(1);
        let _span = info_span!("apply_pass", workers).entered();

        let (tx, rx) = bounded::<Checkable>(queue_capacity);
        let failed = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx = rx.clone();
            let store = Arc::clone(&self.store);
            let kinds = self.kinds.clone();
            let registry = Arc::clone(&self.registry);
            let failed = Arc::clone(&failed);
            let report = self.config.report_for_term_errors;

            let handle = thread::Builder::new()
                .name(format!("confapply-apply-{idx}"))
                .spawn(move || -> Result<ApplyPassSummary, ConfigError> {
                    let mut summary = ApplyPassSummary::default();

                    for target in rx.iter() {
                        if failed.load(Ordering::Relaxed) {
                            continue;
                        }
                        summary.targets += 1;

                        let mut stats = ExpandStats::default();
                        for kind in &kinds {
                            let mut expander =
                                TemplateExpander::new(kind.as_ref(), &registry).report_for_term_errors(report);
                            if let Err(e) = expander.evaluate_apply_rules(&store, &target) {
                                failed.store(true, Ordering::Relaxed);
                                return Err(e);
                            }
                            stats.merge(expander.stats());
                        }

                        summary.instances += stats.instances;
                        summary.for_term_errors += stats.for_term_errors;
                    }

                    Ok(summary)
                })
                .expect("failed to spawn confapply apply worker");
            handles.push(handle);
        }
        drop(rx);

        for target in targets {
            if failed.load(Ordering::Relaxed) || tx.send(target).is_err() {
                break;
            }
        }
        // Workers drain what is queued, then exit.
        drop(tx);

        let mut summary = ApplyPassSummary::default();
        let mut first_error = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(worker)) => summary.merge(worker),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            targets = summary.targets,
            instances = summary.instances,
            for_term_errors = summary.for_term_errors,
            "Apply pass finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{builtin_kinds, DependencyKind, RuleDefinition};
    use crate::expression::Expression;
    use crate::objects::{Host, Service};

    fn store() -> ApplyRuleStore {
        let mut store = ApplyRuleStore::new();
        store.register_type("Dependency", ["Host", "Service"]);
        store.register_type("Service", ["Host"]);
        store
    }

    fn hosts(n: usize) -> Vec<Checkable> {
        (0..n).map(|i| Checkable::from(Host::new(format!("h{i}")))).collect()
    }

    fn pass(store: ApplyRuleStore, kinds: Vec<Arc<dyn ApplyKind>>, config: ApplyPassConfig) -> (ApplyPass, Arc<ItemRegistry>) {
        let registry = Arc::new(ItemRegistry::new());
        (ApplyPass::new(Arc::new(store), kinds, Arc::clone(&registry), config), registry)
    }

    #[test]
    fn test_every_target_is_evaluated() {
        let mut store = store();
        store
            .add_rule(
                "Dependency",
                "Host",
                RuleDefinition::new("all", Expression::Block(Vec::new()), Expression::literal(true)),
            )
            .unwrap();
        let id = store
            .add_rule(
                "Dependency",
                "Host",
                RuleDefinition::new("one", Expression::Block(Vec::new()), Expression::host_name_is("h7")),
            )
            .unwrap();

        let config = ApplyPassConfig {
            workers: 4,
            queue_capacity: 2,
            report_for_term_errors: false,
        };
        let (pass, registry) = pass(store, vec![Arc::new(DependencyKind)], config);
        let summary = pass.run(hosts(50)).unwrap();

        assert_eq!(summary.targets, 50);
        assert_eq!(summary.instances, 51);
        assert_eq!(registry.len(), 51);
        assert!(pass.store.rule(id).has_matches());
    }

    #[test]
    fn test_services_are_targets_too() {
        let mut store = store();
        store
            .add_rule(
                "Dependency",
                "Service",
                RuleDefinition::new("svc", Expression::Block(Vec::new()), Expression::literal(true)),
            )
            .unwrap();

        let host = Arc::new(Host::new("h1"));
        let targets = vec![
            Checkable::Host(Arc::clone(&host)),
            Checkable::from(Service::new(Arc::clone(&host), "ping")),
            Checkable::from(Service::new(host, "ssh")),
        ];

        let (pass, registry) = pass(store, builtin_kinds(), ApplyPassConfig::default());
        let summary = pass.run(targets).unwrap();
        assert_eq!(summary.targets, 3);
        assert_eq!(summary.instances, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_for_term_errors_are_counted_when_reported() {
        let mut store = store();
        let def = RuleDefinition::new("d", Expression::Block(Vec::new()), Expression::literal(true))
            .for_each("x", Expression::var("missing"));
        store.add_rule("Dependency", "Host", def).unwrap();

        let config = ApplyPassConfig {
            report_for_term_errors: true,
            ..ApplyPassConfig::default()
        };
        let (pass, registry) = pass(store, vec![Arc::new(DependencyKind)], config);
        let summary = pass.run(hosts(3)).unwrap();
        assert_eq!(summary.for_term_errors, 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_configuration_error_aborts_pass() {
        let mut store = store();
        let def = RuleDefinition::new("d", Expression::Block(Vec::new()), Expression::literal(true)).for_each(
            "k",
            Expression::Dictionary(vec![("a".to_string(), Expression::literal(1))]),
        );
        store.add_rule("Dependency", "Host", def).unwrap();

        let (pass, _registry) = pass(store, vec![Arc::new(DependencyKind)], ApplyPassConfig::default());
        let err = pass.run(hosts(10)).unwrap_err();
        assert!(matches!(err, ConfigError::ForTermShape { .. }));
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let config = ApplyPassConfig {
            workers: 0,
            queue_capacity: 0,
            report_for_term_errors: false,
        };
        let (pass, _registry) = pass(store(), builtin_kinds(), config);
        assert_eq!(pass.run(hosts(5)).unwrap().targets, 5);
    }
}
