//! Apply rules: storage, matching and expansion.
//!
//! An `apply` rule creates objects of its kind for every host or service its
//! filter matches. Rules are added to an [`ApplyRuleStore`] while the config
//! is loaded; afterwards the store is frozen and an [`ApplyPass`] runs a
//! [`TemplateExpander`] per kind over every target.

mod dependency;
mod expander;
mod kind;
mod pass;
mod rule;
mod service;
mod store;
pub mod targeted;
mod types;

pub use dependency::{DependencyKind, DEPENDENCY_TYPE};
pub use expander::{ExpandStats, TemplateExpander};
pub use kind::{builtin_kinds, register_builtin_kinds, register_kinds, ApplyKind};
pub use pass::{ApplyPass, ApplyPassConfig, ApplyPassSummary};
pub use rule::{ApplyRule, RuleDefinition, RuleId};
pub use service::ServiceKind;
pub use store::ApplyRuleStore;
pub use types::TypeRegistry;
