//! Expansion of matched rules into config items.
//!
//! For one candidate object and one rule the expander builds the evaluation
//! frame, iterates the rule's `for` term and registers a config item per
//! instance that passes the filter.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ConfigItemBuilder, ItemRegistry};
use crate::error::ConfigError;
use crate::frame::ScriptFrame;
use crate::objects::{Checkable, HOST_TYPE, SERVICE_TYPE};
use crate::value::Value;

use super::kind::ApplyKind;
use super::rule::ApplyRule;
use super::store::ApplyRuleStore;

/// Counters collected while expanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandStats {
    /// Config items registered.
    pub instances: usize,
    /// `for` terms that failed to evaluate. Only counted when reporting is
    /// enabled.
    pub for_term_errors: usize,
}

impl ExpandStats {
    /// Adds `other` to `self`.
    pub fn merge(&mut self, other: Self) {
        self.instances += other.instances;
        self.for_term_errors += other.for_term_errors;
    }
}

/// Expands rules of one [`ApplyKind`] into items registered with an
/// [`ItemRegistry`].
pub struct TemplateExpander<'a> {
    kind: &'a dyn ApplyKind,
    registry: &'a ItemRegistry,
    report_for_term_errors: bool,
    stats: ExpandStats,
}

impl<'a> TemplateExpander<'a> {
    /// Creates an expander registering `kind` items into `registry`.
    #[must_use]
    pub fn new(kind: &'a dyn ApplyKind, registry: &'a ItemRegistry) -> Self {
        Self {
            kind,
            registry,
            report_for_term_errors: false,
            stats: ExpandStats::default(),
        }
    }

    /// Logs failing `for` terms at warning level and counts them. They still
    /// produce no instances.
    #[must_use]
    pub const fn report_for_term_errors(mut self, report: bool) -> Self {
        self.report_for_term_errors = report;
        self
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ExpandStats {
        self.stats
    }

    /// Expands `rule` for `checkable`. Returns whether at least one item was
    /// registered, in which case the rule is marked as matched.
    ///
    /// With `skip_filter` the rule's filter is not evaluated; use it for
    /// rules found through the targeted index.
    ///
    /// # Errors
    /// Returns `ConfigError::ForTermShape` if the `for` term's value does not
    /// fit the loop variables, or `ConfigError::InvalidItem` if an instance
    /// cannot be compiled.
    pub fn expand(&mut self, checkable: &Checkable, rule: &ApplyRule, skip_filter: bool) -> Result<bool, ConfigError> {
        let (host, service) = checkable.host_service();

        let mut frame = rule.scope().map_or_else(ScriptFrame::new, ScriptFrame::with_locals);
        frame.set_local("host", host.to_value());
        if let Some(service) = service {
            frame.set_local("service", service.to_value());
        }

        let instances = match rule.for_term() {
            Some(term) => match term.evaluate(&mut frame) {
                Ok(value) => value,
                Err(e) => {
                    if self.report_for_term_errors {
                        self.stats.for_term_errors += 1;
                        warn!(
                            rule = rule.name(),
                            error = %e,
                            "Apply rule '{}' ({}): for-term failed for object '{}'",
                            rule.name(),
                            rule.debug_info(),
                            checkable.name()
                        );
                    } else {
                        debug!(rule = rule.name(), error = %e, "ignoring for-term error");
                    }
                    return Ok(false);
                }
            },
            None => Value::Array(vec![Value::from("")]),
        };

        let mut matched = false;

        match instances {
            Value::Array(items) => {
                if rule.for_value_var().is_some() {
                    return Err(ConfigError::ForTermShape {
                        message: "Dictionary iterator requires value to be a dictionary.",
                        debug_info: rule.debug_info().clone(),
                    });
                }

                for item in items {
                    let mut name = rule.name().to_string();
                    if let Some(key_var) = rule.for_key_var() {
                        name.push_str(&item.to_string());
                        frame.set_local(key_var, item);
                    }

                    matched |= self.expand_instance(checkable, &name, &mut frame, rule, skip_filter)?;
                }
            }

            Value::Dictionary(dict) => {
                let Some(value_var) = rule.for_value_var() else {
                    return Err(ConfigError::ForTermShape {
                        message: "Array iterator requires value to be an array.",
                        debug_info: rule.debug_info().clone(),
                    });
                };

                for (key, value) in dict {
                    let name = format!("{}{key}", rule.name());
                    if let Some(key_var) = rule.for_key_var() {
                        frame.set_local(key_var, key);
                    }
                    frame.set_local(value_var, value);

                    matched |= self.expand_instance(checkable, &name, &mut frame, rule, skip_filter)?;
                }
            }

            _ => {}
        }

        if matched {
            rule.add_match();
        }

        Ok(matched)
    }

    fn expand_instance(
        &mut self,
        checkable: &Checkable,
        short_name: &str,
        frame: &mut ScriptFrame,
        rule: &ApplyRule,
        skip_filter: bool,
    ) -> Result<bool, ConfigError> {
        if !skip_filter {
            match rule.filter().evaluate(frame) {
                Ok(result) if result.is_truthy() => {}
                Ok(_) => return Ok(false),
                Err(e) => {
                    debug!(rule = rule.name(), error = %e, "filter failed, treating as no match");
                    return Ok(false);
                }
            }
        }

        let name = self.kind.object_name(checkable, short_name);

        debug!(
            "Applying {} '{}' to object '{}' for rule {}",
            self.kind.type_name(),
            name,
            checkable.name(),
            rule.debug_info()
        );

        let mut builder = ConfigItemBuilder::new(rule.debug_info().clone());
        builder
            .set_type(self.kind.type_name())
            .set_name(name)
            .set_scope(frame.locals.clone())
            .set_ignore_on_error(rule.ignore_on_error());

        self.kind.inject_relations(&mut builder, checkable, rule);
        builder.add_expression(Arc::clone(rule.body()));

        builder.compile()?.register(self.registry);
        self.stats.instances += 1;

        Ok(true)
    }

    /// Runs every rule of this expander's kind that may apply to
    /// `checkable`: first the regular rules with their filter, then the
    /// rules indexed under its name without.
    ///
    /// # Errors
    /// Returns the first configuration error raised by [`expand`](Self::expand).
    pub fn evaluate_apply_rules(&mut self, store: &ApplyRuleStore, checkable: &Checkable) -> Result<(), ConfigError> {
        let source_type = self.kind.type_name();

        match checkable {
            Checkable::Host(host) => {
                for rule in store.get_rules(source_type, HOST_TYPE) {
                    self.expand(checkable, rule, false)?;
                }
                for rule in store.get_targeted_host_rules(source_type, HOST_TYPE, &host.name) {
                    self.expand(checkable, rule, true)?;
                }
            }
            Checkable::Service(service) => {
                for rule in store.get_rules(source_type, SERVICE_TYPE) {
                    self.expand(checkable, rule, false)?;
                }
                for rule in store.get_targeted_service_rules(source_type, &service.host.name, &service.short_name) {
                    self.expand(checkable, rule, true)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{DependencyKind, RuleDefinition, ServiceKind};
    use crate::debug_info::DebugInfo;
    use crate::expression::Expression;
    use crate::objects::{Host, Service};
    use crate::value::Dictionary;

    fn store() -> ApplyRuleStore {
        let mut store = ApplyRuleStore::new();
        store.register_type("Dependency", ["Host", "Service"]);
        store.register_type("Service", ["Host"]);
        store
    }

    fn host(name: &str) -> Checkable {
        Checkable::from(Host::new(name).with_zone("dmz").with_var("os", "linux"))
    }

    fn body() -> Expression {
        Expression::set_literal("parent_host_name", "db1")
    }

    fn names(registry: &ItemRegistry) -> Vec<String> {
        registry.items().iter().map(|i| i.name().to_string()).collect()
    }

    #[test]
    fn test_single_instance_with_filter() {
        let mut store = store();
        let filter = Expression::eq(
            Expression::index(Expression::field("host", "vars"), Expression::literal("os")),
            Expression::literal("linux"),
        );
        let id = store
            .add_rule("Dependency", "Host", RuleDefinition::new("db", body(), filter))
            .unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        assert!(expander.expand(&host("web1"), store.rule(id), false).unwrap());
        assert!(store.rule(id).has_matches());

        let items = registry.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "web1!db");
        assert_eq!(items[0].type_name(), "Dependency");

        let record = items[0].evaluate().unwrap();
        assert_eq!(record.properties["child_host_name"], Value::from("web1"));
        assert_eq!(record.properties["parent_host_name"], Value::from("db1"));
        assert_eq!(record.properties["zone"], Value::from("dmz"));
    }

    #[test]
    fn test_filter_mismatch_is_not_an_error() {
        let mut store = store();
        let id = store
            .add_rule(
                "Dependency",
                "Host",
                RuleDefinition::new("db", body(), Expression::literal(false)),
            )
            .unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        assert!(!expander.expand(&host("web1"), store.rule(id), false).unwrap());
        assert!(registry.is_empty());
        assert!(!store.rule(id).has_matches());
    }

    #[test]
    fn test_array_for_term_names_instances() {
        let mut store = store();
        let term = Expression::Array(vec![Expression::literal("a"), Expression::literal("b")]);
        let def = RuleDefinition::new("dep-", body(), Expression::literal(true)).for_each("x", term);
        let id = store.add_rule("Dependency", "Host", def).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        assert!(expander.expand(&host("h"), store.rule(id), false).unwrap());
        assert_eq!(names(&registry), ["h!dep-a", "h!dep-b"]);
        assert_eq!(registry.items()[1].scope()["x"], Value::from("b"));
        assert_eq!(expander.stats().instances, 2);
    }

    #[test]
    fn test_dictionary_for_term_binds_key_and_value() {
        let mut store = store();
        let term = Expression::Dictionary(vec![
            ("k1".to_string(), Expression::literal(1)),
            ("k2".to_string(), Expression::literal(2)),
        ]);
        let def = RuleDefinition::new("d", body(), Expression::literal(true)).for_each_pair("k", "v", term);
        let id = store.add_rule("Dependency", "Host", def).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        expander.expand(&host("h"), store.rule(id), false).unwrap();

        let items = registry.items();
        assert_eq!(names(&registry), ["h!dk1", "h!dk2"]);
        assert_eq!(items[0].scope()["k"], Value::from("k1"));
        assert_eq!(items[0].scope()["v"], Value::from(1));
        assert_eq!(items[1].scope()["v"], Value::from(2));
    }

    #[test]
    fn test_for_term_shape_errors() {
        let mut store = store();
        let array_with_value = RuleDefinition::new("a", body(), Expression::literal(true)).for_loop(
            Some("k".to_string()),
            Some("v".to_string()),
            Some(Expression::Array(vec![Expression::literal(1)])),
        );
        let dict_without_value = RuleDefinition::new("b", body(), Expression::literal(true)).for_each(
            "k",
            Expression::Dictionary(vec![("x".to_string(), Expression::literal(1))]),
        );
        let a = store.add_rule("Dependency", "Host", array_with_value).unwrap();
        let b = store.add_rule("Dependency", "Host", dict_without_value).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);

        let err = expander.expand(&host("h"), store.rule(a), false).unwrap_err();
        assert!(err.to_string().contains("Dictionary iterator requires value to be a dictionary."));

        let err = expander.expand(&host("h"), store.rule(b), false).unwrap_err();
        assert!(err.to_string().contains("Array iterator requires value to be an array."));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failing_for_term_means_no_instances() {
        let mut store = store();
        let def = RuleDefinition::new("d", body(), Expression::literal(true)).for_each("x", Expression::var("undefined"));
        let id = store.add_rule("Dependency", "Host", def).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        assert!(!expander.expand(&host("h"), store.rule(id), false).unwrap());
        assert_eq!(expander.stats().for_term_errors, 0);

        let mut expander = TemplateExpander::new(&DependencyKind, &registry).report_for_term_errors(true);
        assert!(!expander.expand(&host("h"), store.rule(id), false).unwrap());
        assert_eq!(expander.stats().for_term_errors, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_scalar_for_term_means_no_instances() {
        let mut store = store();
        let def = RuleDefinition::new("d", body(), Expression::literal(true)).for_each("x", Expression::literal(5));
        let id = store.add_rule("Dependency", "Host", def).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        assert!(!expander.expand(&host("h"), store.rule(id), false).unwrap());
    }

    #[test]
    fn test_captured_scope_is_visible() {
        let mut store = store();
        let mut scope = Dictionary::new();
        scope.insert("parents".to_string(), Value::Array(vec![Value::from("db1"), Value::from("db2")]));
        let def = RuleDefinition::new("p-", body(), Expression::literal(true))
            .for_each("parent", Expression::var("parents"))
            .scope(Arc::new(scope));
        let id = store.add_rule("Dependency", "Host", def).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        expander.expand(&host("h"), store.rule(id), false).unwrap();
        assert_eq!(names(&registry), ["h!p-db1", "h!p-db2"]);
    }

    #[test]
    fn test_driver_runs_regular_and_targeted_rules() {
        let mut store = store();
        store
            .add_rule("Dependency", "Host", RuleDefinition::new("all", body(), Expression::literal(true)))
            .unwrap();
        let targeted = store
            .add_rule(
                "Dependency",
                "Host",
                RuleDefinition::new("only-h1", body(), Expression::host_name_is("h1")),
            )
            .unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        expander.evaluate_apply_rules(&store, &host("h1")).unwrap();
        expander.evaluate_apply_rules(&store, &host("h2")).unwrap();

        assert_eq!(names(&registry), ["h1!all", "h1!only-h1", "h2!all"]);
        assert!(store.rule(targeted).has_matches());
    }

    #[test]
    fn test_service_driver_uses_service_index() {
        let mut store = store();
        let filter = Expression::and(Expression::host_name_is("h1"), Expression::service_name_is("ping"));
        let id = store
            .add_rule(
                "Dependency",
                "Service",
                RuleDefinition::new("svc", body(), filter).debug_info(DebugInfo::new("deps.conf", 1, 1, 2, 1)),
            )
            .unwrap();

        let h1 = Arc::new(Host::new("h1"));
        let ping = Checkable::from(Service::new(Arc::clone(&h1), "ping").with_zone("z1"));
        let ssh = Checkable::from(Service::new(h1, "ssh"));

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&DependencyKind, &registry);
        expander.evaluate_apply_rules(&store, &ping).unwrap();
        expander.evaluate_apply_rules(&store, &ssh).unwrap();

        assert_eq!(names(&registry), ["h1!ping!svc"]);
        assert!(store.rule(id).has_matches());

        let record = registry.items()[0].evaluate().unwrap();
        assert_eq!(record.properties["child_service_name"], Value::from("ping"));
        assert_eq!(record.properties["zone"], Value::from("z1"));
    }

    #[test]
    fn test_service_kind_uses_unqualified_host_target() {
        let mut store = store();
        let def = RuleDefinition::new("ping", Expression::set_literal("check_command", "ping4"), Expression::literal(true))
            .package("_etc");
        store.add_rule("Service", "", def).unwrap();

        let registry = ItemRegistry::new();
        let mut expander = TemplateExpander::new(&ServiceKind, &registry);
        expander.evaluate_apply_rules(&store, &host("web1")).unwrap();

        let record = registry.items()[0].evaluate().unwrap();
        assert_eq!(record.name, "web1!ping");
        assert_eq!(record.properties["host_name"], Value::from("web1"));
        assert_eq!(record.properties["package"], Value::from("_etc"));
        assert_eq!(record.properties["check_command"], Value::from("ping4"));
    }
}
