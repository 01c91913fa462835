//! Indexed storage of apply rules.
//!
//! Rules live in an arena and are referenced by [`RuleId`] from two
//! partitions per (source type, target type):
//! - `regular`: rules whose filter must be evaluated for every candidate,
//! - `targeted`: rules whose filter pins literal host (and service) names,
//!   indexed by those names so that matching is a lookup.
//!
//! A rule is in exactly one partition. A targeted rule may appear under
//! several names. The store is filled during config load and read-only
//! while apply workers match against it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::error::ConfigError;
use crate::objects::{HOST_TYPE, SERVICE_TYPE};

use super::rule::{ApplyRule, RuleDefinition, RuleId};
use super::targeted::{target_hosts, target_services};
use super::types::TypeRegistry;

#[derive(Debug, Default)]
struct PerHost {
    for_host: Vec<RuleId>,
    for_services: HashMap<String, Vec<RuleId>>,
}

#[derive(Debug, Default)]
struct PerTargetType {
    regular: Vec<RuleId>,
    targeted: HashMap<String, PerHost>,
}

/// Rules keyed by source type, then target type.
#[derive(Debug, Default)]
pub struct ApplyRuleStore {
    types: TypeRegistry,
    rules: Vec<ApplyRule>,
    index: BTreeMap<String, BTreeMap<String, PerTargetType>>,
}

impl ApplyRuleStore {
    /// Creates an empty store with no registered types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the legal target types of `source_type`, replacing any
    /// earlier registration.
    pub fn register_type<I, S>(&mut self, source_type: impl Into<String>, target_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.register_type(source_type, target_types);
    }

    /// Whether `source_type` was registered.
    #[must_use]
    pub fn is_valid_source_type(&self, source_type: &str) -> bool {
        self.types.is_valid_source_type(source_type)
    }

    /// Whether `target_type` is legal for `source_type`.
    #[must_use]
    pub fn is_valid_target_type(&self, source_type: &str, target_type: &str) -> bool {
        self.types.is_valid_target_type(source_type, target_type)
    }

    /// Adds a rule, classifying it as targeted or regular.
    ///
    /// An empty `target_type` resolves to the single legal target of
    /// `source_type`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the source type is unknown or the target
    /// type is invalid or ambiguous.
    pub fn add_rule(
        &mut self,
        source_type: &str,
        target_type: &str,
        definition: RuleDefinition,
    ) -> Result<RuleId, ConfigError> {
        let target_type = self.types.resolve_target_type(source_type, target_type)?;

        let id = RuleId::from_index(self.rules.len()).ok_or_else(|| ConfigError::InvalidItem {
            reason: "too many apply rules".to_string(),
        })?;

        let per_target = self
            .index
            .entry(source_type.to_string())
            .or_default()
            .entry(target_type.clone())
            .or_default();

        let targeted = if target_type == HOST_TYPE {
            match target_hosts(&definition.filter) {
                Some(hosts) => {
                    for host in hosts {
                        per_target.targeted.entry(host.to_string()).or_default().for_host.push(id);
                    }
                    true
                }
                None => false,
            }
        } else if target_type == SERVICE_TYPE {
            match target_services(&definition.filter) {
                Some(services) => {
                    for (host, service) in services {
                        per_target
                            .targeted
                            .entry(host.to_string())
                            .or_default()
                            .for_services
                            .entry(service.to_string())
                            .or_default()
                            .push(id);
                    }
                    true
                }
                None => false,
            }
        } else {
            false
        };

        if !targeted {
            per_target.regular.push(id);
        }

        self.rules.push(ApplyRule::new(id, definition, targeted));
        Ok(id)
    }

    /// Returns the rule stored under `id`.
    ///
    /// # Panics
    /// Panics if `id` was not issued by this store.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &ApplyRule {
        &self.rules[id.index()]
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn per_target(&self, source_type: &str, target_type: &str) -> Option<&PerTargetType> {
        self.index.get(source_type)?.get(target_type)
    }

    fn resolve<'a>(&'a self, ids: &'a [RuleId]) -> impl Iterator<Item = &'a ApplyRule> + 'a {
        ids.iter().map(move |id| self.rule(*id))
    }

    /// Regular rules that must be filter-tested against every candidate of
    /// `target_type`, in declaration order.
    pub fn get_rules<'a>(&'a self, source_type: &str, target_type: &str) -> impl Iterator<Item = &'a ApplyRule> + 'a {
        let ids = self
            .per_target(source_type, target_type)
            .map_or(&[][..], |p| p.regular.as_slice());
        self.resolve(ids)
    }

    /// Targeted rules indexed under host `host`.
    pub fn get_targeted_host_rules<'a>(
        &'a self,
        source_type: &str,
        target_type: &str,
        host: &str,
    ) -> impl Iterator<Item = &'a ApplyRule> + 'a {
        let ids = self
            .per_target(source_type, target_type)
            .and_then(|p| p.targeted.get(host))
            .map_or(&[][..], |h| h.for_host.as_slice());
        self.resolve(ids)
    }

    /// Targeted rules indexed under service `service` of host `host`.
    pub fn get_targeted_service_rules<'a>(
        &'a self,
        source_type: &str,
        host: &str,
        service: &str,
    ) -> impl Iterator<Item = &'a ApplyRule> + 'a {
        let ids = self
            .per_target(source_type, SERVICE_TYPE)
            .and_then(|p| p.targeted.get(host))
            .and_then(|h| h.for_services.get(service))
            .map_or(&[][..], Vec::as_slice);
        self.resolve(ids)
    }

    /// Reports every rule that never matched.
    ///
    /// Regular rules are visited in declaration order per (source, target),
    /// then each distinct targeted rule once. A warning is logged for every
    /// unmatched rule unless `silent`; the unmatched rules are returned
    /// either way.
    pub fn check_matches(&self, silent: bool) -> Vec<&ApplyRule> {
        let mut unmatched = Vec::new();

        for (source_type, per_source) in &self.index {
            let mut targeted = BTreeSet::new();

            for per_target in per_source.values() {
                for rule in self.resolve(&per_target.regular) {
                    self.check_rule(rule, source_type, silent, &mut unmatched);
                }

                for per_host in per_target.targeted.values() {
                    targeted.extend(per_host.for_host.iter().copied());
                    for ids in per_host.for_services.values() {
                        targeted.extend(ids.iter().copied());
                    }
                }
            }

            for id in targeted {
                self.check_rule(self.rule(id), source_type, silent, &mut unmatched);
            }
        }

        unmatched
    }

    fn check_rule<'a>(&self, rule: &'a ApplyRule, source_type: &str, silent: bool, unmatched: &mut Vec<&'a ApplyRule>) {
        if rule.has_matches() {
            return;
        }

        if !silent {
            warn!(
                rule = rule.name(),
                source_type,
                "Apply rule '{}' ({}) for type '{}' does not match anywhere!",
                rule.name(),
                rule.debug_info(),
                source_type
            );
        }

        unmatched.push(rule);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;

    fn store() -> ApplyRuleStore {
        let mut store = ApplyRuleStore::new();
        store.register_type("Dependency", ["Host", "Service"]);
        store.register_type("Service", ["Host"]);
        store
    }

    fn rule(name: &str, filter: Expression) -> RuleDefinition {
        RuleDefinition::new(name, Expression::Block(Vec::new()), filter)
    }

    fn names<'a>(rules: impl Iterator<Item = &'a ApplyRule>) -> Vec<&'a str> {
        rules.map(ApplyRule::name).collect()
    }

    #[test]
    fn test_literal_host_filter_is_targeted() {
        let mut store = store();
        let id = store
            .add_rule("Dependency", "Host", rule("dep", Expression::host_name_is("web1")))
            .unwrap();

        assert!(store.rule(id).is_targeted());
        assert_eq!(names(store.get_targeted_host_rules("Dependency", "Host", "web1")), ["dep"]);
        assert_eq!(store.get_targeted_host_rules("Dependency", "Host", "web2").count(), 0);
        assert_eq!(store.get_rules("Dependency", "Host").count(), 0);
    }

    #[test]
    fn test_or_filter_indexed_under_every_name() {
        let mut store = store();
        let filter = Expression::or(
            Expression::host_name_is("a"),
            Expression::or(Expression::host_name_is("b"), Expression::host_name_is("a")),
        );
        let id = store.add_rule("Dependency", "Host", rule("dep", filter)).unwrap();

        for host in ["a", "b"] {
            let found: Vec<_> = store
                .get_targeted_host_rules("Dependency", "Host", host)
                .map(ApplyRule::id)
                .collect();
            assert_eq!(found, [id], "host {host}");
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mixed_filter_falls_back_to_regular() {
        let mut store = store();
        let filter = Expression::or(
            Expression::host_name_is("a"),
            Expression::eq(Expression::field("host", "zone"), Expression::literal("dmz")),
        );
        let id = store.add_rule("Dependency", "Host", rule("dep", filter)).unwrap();

        assert!(!store.rule(id).is_targeted());
        assert_eq!(names(store.get_rules("Dependency", "Host")), ["dep"]);
        assert_eq!(store.get_targeted_host_rules("Dependency", "Host", "a").count(), 0);
    }

    #[test]
    fn test_service_rules() {
        let mut store = store();
        let filter = Expression::and(Expression::service_name_is("ping"), Expression::host_name_is("h1"));
        store.add_rule("Dependency", "Service", rule("svc-dep", filter)).unwrap();

        assert_eq!(names(store.get_targeted_service_rules("Dependency", "h1", "ping")), ["svc-dep"]);
        assert_eq!(store.get_targeted_service_rules("Dependency", "h1", "ssh").count(), 0);
        assert_eq!(store.get_targeted_host_rules("Dependency", "Host", "h1").count(), 0);
        assert_eq!(store.get_rules("Dependency", "Service").count(), 0);
    }

    #[test]
    fn test_host_filter_on_service_target_is_regular() {
        let mut store = store();
        store
            .add_rule("Dependency", "Service", rule("dep", Expression::host_name_is("h1")))
            .unwrap();
        assert_eq!(names(store.get_rules("Dependency", "Service")), ["dep"]);
    }

    #[test]
    fn test_unqualified_target_resolves_to_single_target() {
        let mut store = store();
        let id = store
            .add_rule("Service", "", rule("ping", Expression::host_name_is("h1")))
            .unwrap();
        assert!(store.rule(id).is_targeted());
        assert_eq!(names(store.get_targeted_host_rules("Service", "Host", "h1")), ["ping"]);
    }

    #[test]
    fn test_invalid_targets_are_rejected() {
        let mut store = store();
        let err = store
            .add_rule("Dependency", "", rule("dep", Expression::literal(true)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousTargetType { .. }));

        let err = store
            .add_rule("Dependency", "Zone", rule("dep", Expression::literal(true)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTargetType { .. }));

        let err = store
            .add_rule("Downtime", "Host", rule("dt", Expression::literal(true)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSourceType { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_regular_order_is_declaration_order() {
        let mut store = store();
        for name in ["first", "second", "third"] {
            store
                .add_rule("Dependency", "Host", rule(name, Expression::literal(true)))
                .unwrap();
        }
        assert_eq!(names(store.get_rules("Dependency", "Host")), ["first", "second", "third"]);
    }

    #[test]
    fn test_check_matches_counts_distinct_rules() {
        let mut store = store();
        let targeted = store
            .add_rule(
                "Dependency",
                "Host",
                rule("multi", Expression::or(Expression::host_name_is("a"), Expression::host_name_is("b"))),
            )
            .unwrap();
        let regular = store
            .add_rule("Dependency", "Host", rule("all", Expression::literal(true)))
            .unwrap();

        assert_eq!(store.check_matches(true).len(), 2);

        store.rule(targeted).add_match();
        let unmatched: Vec<_> = store.check_matches(false).iter().map(|r| r.id()).collect();
        assert_eq!(unmatched, [regular]);

        store.rule(regular).add_match();
        assert!(store.check_matches(false).is_empty());
    }
}
