//! Config items: named objects whose attributes are set by expressions.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::debug_info::DebugInfo;
use crate::error::{ApplyResult, ConfigError, EvaluationError};
use crate::expression::Expression;
use crate::frame::ScriptFrame;
use crate::storage::ObjectRecord;
use crate::value::{Dictionary, Value};

use super::ConfigCompilerContext;

/// Collects the pieces of a config item.
///
/// Expressions run in the order they were added, so relationship fields set
/// first can be overridden by a rule body added last.
#[derive(Debug, Clone, Default)]
pub struct ConfigItemBuilder {
    type_name: Option<String>,
    name: String,
    scope: Dictionary,
    ignore_on_error: bool,
    debug_info: DebugInfo,
    expressions: Vec<Arc<Expression>>,
}

impl ConfigItemBuilder {
    /// Starts a builder for an item declared at `debug_info`.
    #[must_use]
    pub fn new(debug_info: DebugInfo) -> Self {
        Self {
            debug_info,
            ..Self::default()
        }
    }

    /// Sets the object type.
    pub fn set_type(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Sets the object name.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Variables visible to the item's expressions.
    pub fn set_scope(&mut self, scope: Dictionary) -> &mut Self {
        self.scope = scope;
        self
    }

    /// Drops the item at commit if it fails to evaluate.
    pub fn set_ignore_on_error(&mut self, ignore: bool) -> &mut Self {
        self.ignore_on_error = ignore;
        self
    }

    /// Appends an expression to the item body.
    pub fn add_expression(&mut self, expression: impl Into<Arc<Expression>>) -> &mut Self {
        self.expressions.push(expression.into());
        self
    }

    /// # Errors
    /// Returns `ConfigError::InvalidItem` if no type was set or the name is
    /// empty.
    pub fn compile(self) -> Result<ConfigItem, ConfigError> {
        let Some(type_name) = self.type_name.filter(|t| !t.is_empty()) else {
            return Err(ConfigError::InvalidItem {
                reason: format!("item '{}' has no type ({})", self.name, self.debug_info),
            });
        };

        if self.name.is_empty() {
            return Err(ConfigError::InvalidItem {
                reason: format!("item of type '{type_name}' has an empty name ({})", self.debug_info),
            });
        }

        Ok(ConfigItem {
            type_name,
            name: self.name,
            scope: self.scope,
            ignore_on_error: self.ignore_on_error,
            debug_info: self.debug_info,
            expressions: self.expressions,
        })
    }
}

/// A compiled config item, ready to be registered and later evaluated.
#[derive(Debug, Clone)]
pub struct ConfigItem {
    type_name: String,
    name: String,
    scope: Dictionary,
    ignore_on_error: bool,
    debug_info: DebugInfo,
    expressions: Vec<Arc<Expression>>,
}

impl ConfigItem {
    /// Object type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locals visible to the body.
    #[must_use]
    pub fn scope(&self) -> &Dictionary {
        &self.scope
    }

    /// Whether evaluation errors drop the item.
    #[must_use]
    pub const fn ignore_on_error(&self) -> bool {
        self.ignore_on_error
    }

    /// Declaration site.
    #[must_use]
    pub const fn debug_info(&self) -> &DebugInfo {
        &self.debug_info
    }

    /// Hands the item to `registry`.
    pub fn register(self, registry: &ItemRegistry) {
        registry.register(self);
    }

    /// Runs the expressions against a fresh object whose `name` field is
    /// preset to the item name.
    ///
    /// # Errors
    /// Returns the first expression's evaluation error.
    pub fn evaluate(&self) -> Result<ObjectRecord, EvaluationError> {
        let mut this = Dictionary::new();
        this.insert("name".to_string(), Value::from(self.name.as_str()));

        let mut frame = ScriptFrame::with_locals(&self.scope);
        frame.this = Some(this);

        for expression in &self.expressions {
            expression.evaluate(&mut frame)?;
        }

        Ok(ObjectRecord {
            type_name: self.type_name.clone(),
            name: self.name.clone(),
            properties: frame.this.unwrap_or_default(),
            debug_info: self.debug_info.clone(),
        })
    }
}

/// Outcome of [`ItemRegistry::commit_items`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Records written.
    pub committed: usize,
    /// Items dropped because they failed and ignore errors.
    pub ignored: usize,
}

/// Thread-safe collection of registered items.
///
/// Every registration is kept, including several items of the same type and
/// name: duplicates are reported when committing.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: Mutex<Vec<ConfigItem>>,
}

impl ItemRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item`; duplicates are kept.
    pub fn register(&self, item: ConfigItem) {
        debug!(type_name = %item.type_name, name = %item.name, "registered config item");
        self.items.lock().unwrap_or_else(PoisonError::into_inner).push(item);
    }

    /// Number of registered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of the registered items, in registration order.
    #[must_use]
    pub fn items(&self) -> Vec<ConfigItem> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Removes the `count` oldest registrations.
    ///
    /// Items registered after a commit snapshot was taken stay in place.
    pub fn discard_committed(&self, count: usize) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let count = count.min(items.len());
        items.drain(..count);
    }

    /// Evaluates every registered item and writes one record per object to
    /// `context`, ordered by type, then name.
    ///
    /// Works on a snapshot and leaves the registry untouched, so a failed
    /// commit can be retried with the same items. Every snapshotted item is
    /// either committed or ignored on success; pass `committed + ignored` to
    /// [`ItemRegistry::discard_committed`] once the file is in place.
    ///
    /// # Errors
    /// - `ConfigError::DuplicateObject` if two items share type and name and
    ///   the later one does not ignore errors
    /// - `ConfigError::ItemEvaluation` if an item that does not ignore errors
    ///   fails to evaluate
    /// - a storage error if a record cannot be written
    pub fn commit_items(&self, context: &ConfigCompilerContext) -> ApplyResult<CommitSummary> {
        let mut items = self.items();
        items.sort_by(|a, b| (&a.type_name, &a.name).cmp(&(&b.type_name, &b.name)));

        let mut summary = CommitSummary::default();
        let mut last_committed: Option<(&str, &str)> = None;

        for item in &items {
            if last_committed == Some((item.type_name.as_str(), item.name.as_str())) {
                if item.ignore_on_error {
                    warn!(
                        type_name = %item.type_name,
                        name = %item.name,
                        "Ignoring duplicate object '{}' of type '{}' ({})",
                        item.name,
                        item.type_name,
                        item.debug_info
                    );
                    summary.ignored += 1;
                    continue;
                }

                return Err(ConfigError::DuplicateObject {
                    type_name: item.type_name.clone(),
                    name: item.name.clone(),
                    debug_info: item.debug_info.clone(),
                }
                .into());
            }

            match item.evaluate() {
                Ok(record) => {
                    context.write_object(&record)?;
                    summary.committed += 1;
                    last_committed = Some((item.type_name.as_str(), item.name.as_str()));
                }
                Err(source) if item.ignore_on_error => {
                    warn!(
                        type_name = %item.type_name,
                        name = %item.name,
                        error = %source,
                        "Ignoring config object '{}' of type '{}' ({}) due to errors",
                        item.name,
                        item.type_name,
                        item.debug_info
                    );
                    summary.ignored += 1;
                }
                Err(source) => {
                    return Err(ConfigError::ItemEvaluation {
                        type_name: item.type_name.clone(),
                        name: item.name.clone(),
                        debug_info: item.debug_info.clone(),
                        source,
                    }
                    .into());
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApplyError;

    fn item(type_name: &str, name: &str, body: Expression) -> ConfigItem {
        let mut builder = ConfigItemBuilder::new(DebugInfo::new("test.conf", 1, 1, 1, 10));
        builder.set_type(type_name).set_name(name).add_expression(body);
        builder.compile().unwrap()
    }

    #[test]
    fn test_compile_requires_type_and_name() {
        let mut builder = ConfigItemBuilder::default();
        builder.set_name("x");
        assert!(matches!(builder.compile(), Err(ConfigError::InvalidItem { .. })));

        let mut builder = ConfigItemBuilder::default();
        builder.set_type("Dependency");
        assert!(matches!(builder.compile(), Err(ConfigError::InvalidItem { .. })));
    }

    #[test]
    fn test_evaluate_runs_expressions_in_order() {
        let mut scope = Dictionary::new();
        scope.insert("parent".to_string(), Value::from("db1"));

        let mut builder = ConfigItemBuilder::default();
        builder
            .set_type("Dependency")
            .set_name("web1!db")
            .set_scope(scope)
            .add_expression(Expression::set_literal("zone", "master"))
            .add_expression(Expression::set("parent_host_name", Expression::var("parent")))
            .add_expression(Expression::set_literal("zone", "dmz"));

        let record = builder.compile().unwrap().evaluate().unwrap();
        assert_eq!(record.type_name, "Dependency");
        assert_eq!(record.properties["name"], Value::from("web1!db"));
        assert_eq!(record.properties["parent_host_name"], Value::from("db1"));
        assert_eq!(record.properties["zone"], Value::from("dmz"));
    }

    #[test]
    fn test_evaluate_reports_undefined_variable() {
        let err = item("Dependency", "d", Expression::set("x", Expression::var("missing")))
            .evaluate()
            .unwrap_err();
        assert!(matches!(err, EvaluationError::UndefinedVariable { .. }));
    }

    #[test]
    fn test_registry_keeps_duplicates_and_discards_oldest() {
        let registry = ItemRegistry::new();
        item("Dependency", "a", Expression::Block(Vec::new())).register(&registry);
        item("Dependency", "a", Expression::Block(Vec::new())).register(&registry);
        item("Dependency", "late", Expression::Block(Vec::new())).register(&registry);
        assert_eq!(registry.len(), 3);

        registry.discard_committed(2);
        let left: Vec<_> = registry.items().iter().map(|i| i.name().to_string()).collect();
        assert_eq!(left, ["late"]);

        registry.discard_committed(10);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_commit_without_open_file_still_evaluates() {
        let registry = ItemRegistry::new();
        item("Dependency", "b", Expression::Block(Vec::new())).register(&registry);
        item("Dependency", "a", Expression::Block(Vec::new())).register(&registry);

        let summary = registry.commit_items(&ConfigCompilerContext::new()).unwrap();
        assert_eq!(summary, CommitSummary { committed: 2, ignored: 0 });
    }

    #[test]
    fn test_commit_rejects_duplicates() {
        let registry = ItemRegistry::new();
        item("Dependency", "a", Expression::Block(Vec::new())).register(&registry);
        item("Dependency", "a", Expression::Block(Vec::new())).register(&registry);

        let err = registry.commit_items(&ConfigCompilerContext::new()).unwrap_err();
        assert!(matches!(err, ApplyError::Config(ConfigError::DuplicateObject { .. })));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_commit_drops_failing_items_that_ignore_errors() {
        let registry = ItemRegistry::new();
        let mut builder = ConfigItemBuilder::default();
        builder
            .set_type("Dependency")
            .set_name("broken")
            .set_ignore_on_error(true)
            .add_expression(Expression::set("x", Expression::var("missing")));
        builder.compile().unwrap().register(&registry);
        item("Dependency", "ok", Expression::Block(Vec::new())).register(&registry);

        let summary = registry.commit_items(&ConfigCompilerContext::new()).unwrap();
        assert_eq!(summary, CommitSummary { committed: 1, ignored: 1 });
    }

    #[test]
    fn test_commit_fails_on_item_error() {
        let registry = ItemRegistry::new();
        item("Dependency", "broken", Expression::set("x", Expression::var("missing"))).register(&registry);

        let err = registry.commit_items(&ConfigCompilerContext::new()).unwrap_err();
        assert!(matches!(err, ApplyError::Config(ConfigError::ItemEvaluation { .. })));
    }
}
