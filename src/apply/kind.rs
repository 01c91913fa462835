//! Object types that can be created by `apply` rules.

use std::sync::Arc;

use crate::config::ConfigItemBuilder;
use crate::loader::{DeferredInitializers, PRIORITY_REGISTER_TYPES};
use crate::objects::Checkable;

use super::dependency::DependencyKind;
use super::rule::ApplyRule;
use super::service::ServiceKind;
use super::store::ApplyRuleStore;

/// One apply-able object type.
pub trait ApplyKind: Send + Sync {
    /// Type of the objects the rules create; also the rules' source type.
    fn type_name(&self) -> &'static str;

    /// Object types the rules may target, in preference order.
    fn target_types(&self) -> &'static [&'static str];

    /// Name of the object created for `checkable` from the instance name
    /// `short_name`.
    fn object_name(&self, checkable: &Checkable, short_name: &str) -> String;

    /// Adds the assignments tying the new object to `checkable`. They run
    /// before the rule body, which may override them.
    fn inject_relations(&self, builder: &mut ConfigItemBuilder, checkable: &Checkable, rule: &ApplyRule);
}

/// The kinds shipped with the crate.
#[must_use]
pub fn builtin_kinds() -> Vec<Arc<dyn ApplyKind>> {
    vec![Arc::new(DependencyKind), Arc::new(ServiceKind)]
}

/// Schedules the type registration of every kind in `kinds`.
pub fn register_kinds(initializers: &mut DeferredInitializers<ApplyRuleStore>, kinds: &[Arc<dyn ApplyKind>]) {
    for kind in kinds {
        let kind = Arc::clone(kind);
        initializers.add(PRIORITY_REGISTER_TYPES, move |store| {
            store.register_type(kind.type_name(), kind.target_types().iter().copied());
        });
    }
}

/// Schedules the type registration of the built-in kinds.
pub fn register_builtin_kinds(initializers: &mut DeferredInitializers<ApplyRuleStore>) {
    register_kinds(initializers, &builtin_kinds());
}
