//! Apply rule definitions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::debug_info::DebugInfo;
use crate::expression::Expression;
use crate::value::Dictionary;

/// Stable handle of a rule inside an [`ApplyRuleStore`](super::ApplyRuleStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything an `apply` declaration carries, before it is stored.
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    /// Name (prefix) of the materialized objects.
    pub name: String,
    /// Body run against each materialized object.
    pub body: Expression,
    /// `assign where` filter evaluated against the candidate.
    pub filter: Expression,
    /// Config package the rule came from.
    pub package: String,
    /// Key (or element) variable of the `for` loop.
    pub for_key_var: Option<String>,
    /// Value variable of a dictionary `for` loop.
    pub for_value_var: Option<String>,
    /// Iterated expression of the `for` loop.
    pub for_term: Option<Expression>,
    /// Drop materialized objects whose body fails instead of failing the commit.
    pub ignore_on_error: bool,
    /// Declaration site.
    pub debug_info: DebugInfo,
    /// Lexical variables captured at declaration.
    pub scope: Option<Arc<Dictionary>>,
}

impl RuleDefinition {
    /// Creates a single-instance rule.
    #[must_use]
    pub fn new(name: impl Into<String>, body: Expression, filter: Expression) -> Self {
        Self {
            name: name.into(),
            body,
            filter,
            package: String::new(),
            for_key_var: None,
            for_value_var: None,
            for_term: None,
            ignore_on_error: false,
            debug_info: DebugInfo::default(),
            scope: None,
        }
    }

    /// Sets the provenance package.
    #[must_use]
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// `for (key in term)`.
    #[must_use]
    pub fn for_each(mut self, key_var: impl Into<String>, term: Expression) -> Self {
        self.for_key_var = Some(key_var.into());
        self.for_value_var = None;
        self.for_term = Some(term);
        self
    }

    /// `for (key => value in term)`.
    #[must_use]
    pub fn for_each_pair(
        mut self,
        key_var: impl Into<String>,
        value_var: impl Into<String>,
        term: Expression,
    ) -> Self {
        self.for_key_var = Some(key_var.into());
        self.for_value_var = Some(value_var.into());
        self.for_term = Some(term);
        self
    }

    /// Sets the loop variables and term directly, including shapes the
    /// grammar would reject; used to exercise expansion errors.
    #[must_use]
    pub fn for_loop(
        mut self,
        key_var: Option<String>,
        value_var: Option<String>,
        term: Option<Expression>,
    ) -> Self {
        self.for_key_var = key_var;
        self.for_value_var = value_var;
        self.for_term = term;
        self
    }

    /// Drops created objects that fail to evaluate instead of failing the commit.
    #[must_use]
    pub fn ignore_on_error(mut self, ignore: bool) -> Self {
        self.ignore_on_error = ignore;
        self
    }

    /// Sets the declaration site.
    #[must_use]
    pub fn debug_info(mut self, debug_info: DebugInfo) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Sets the variables captured where the rule was declared.
    #[must_use]
    pub fn scope(mut self, scope: Arc<Dictionary>) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// A stored apply rule.
///
/// Immutable once stored, except for the match flag which only ever goes
/// from false to true and may be set from several apply workers at once.
#[derive(Debug)]
pub struct ApplyRule {
    id: RuleId,
    name: String,
    body: Arc<Expression>,
    filter: Expression,
    package: String,
    for_key_var: Option<String>,
    for_value_var: Option<String>,
    for_term: Option<Expression>,
    ignore_on_error: bool,
    debug_info: DebugInfo,
    scope: Option<Arc<Dictionary>>,
    targeted: bool,
    has_matches: AtomicBool,
}

impl ApplyRule {
    pub(crate) fn new(id: RuleId, definition: RuleDefinition, targeted: bool) -> Self {
        Self {
            id,
            name: definition.name,
            body: Arc::new(definition.body),
            filter: definition.filter,
            package: definition.package,
            for_key_var: definition.for_key_var.filter(|v| !v.is_empty()),
            for_value_var: definition.for_value_var.filter(|v| !v.is_empty()),
            for_term: definition.for_term,
            ignore_on_error: definition.ignore_on_error,
            debug_info: definition.debug_info,
            scope: definition.scope,
            targeted,
            has_matches: AtomicBool::new(false),
        }
    }

    /// Stable id within the owning store.
    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    /// Rule name, the base of every created object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression that sets the fields of created objects.
    #[must_use]
    pub fn body(&self) -> &Arc<Expression> {
        &self.body
    }

    /// Boolean filter evaluated per candidate.
    #[must_use]
    pub const fn filter(&self) -> &Expression {
        &self.filter
    }

    /// Provenance package.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Variable bound to each element or key of the `for` term.
    #[must_use]
    pub fn for_key_var(&self) -> Option<&str> {
        self.for_key_var.as_deref()
    }

    /// Variable bound to each value of a dictionary `for` term.
    #[must_use]
    pub fn for_value_var(&self) -> Option<&str> {
        self.for_value_var.as_deref()
    }

    /// Expression producing the instances, if any.
    #[must_use]
    pub const fn for_term(&self) -> Option<&Expression> {
        self.for_term.as_ref()
    }

    /// Whether created objects ignore evaluation errors.
    #[must_use]
    pub const fn ignore_on_error(&self) -> bool {
        self.ignore_on_error
    }

    /// Declaration site.
    #[must_use]
    pub const fn debug_info(&self) -> &DebugInfo {
        &self.debug_info
    }

    /// Captured declaration scope.
    #[must_use]
    pub fn scope(&self) -> Option<&Dictionary> {
        self.scope.as_deref()
    }

    /// Whether the rule lives in the targeted partition.
    #[must_use]
    pub const fn is_targeted(&self) -> bool {
        self.targeted
    }

    /// Records that the rule produced at least one object.
    pub fn add_match(&self) {
        self.has_matches.store(true, Ordering::Relaxed);
    }

    /// Whether any candidate matched so far.
    #[must_use]
    pub fn has_matches(&self) -> bool {
        self.has_matches.load(Ordering::Relaxed)
    }
}
