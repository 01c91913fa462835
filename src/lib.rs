//! # confapply - apply-rule materialization for monitoring configuration
//!
//! `apply` rules declare objects (dependencies, services, ...) once and have
//! them created for every host or service their filter matches. This crate
//! holds the machinery between parsed rules and the committed objects file.
//!
//! ## Core Concepts
//!
//! - **ApplyRuleStore**: rules indexed by source and target type, with a
//!   targeted partition for filters that pin literal host/service names
//! - **TemplateExpander**: turns one matching rule into config items, one per
//!   `for` instance
//! - **CommitPipeline**: writes all items as netstring-framed JSON through an
//!   atomically replaced file while holding the config objects lock
//! - **ConfigObjectsLock**: reader/writer lock shared with forked processes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use confapply::{
//!     ApplyEngine, ApplyPassConfig, Checkable, CommitConfig, CommitPipeline, ConfigObjectsLock,
//!     Expression, Host, RuleDefinition,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lock = ConfigObjectsLock::install_global()?;
//!
//! let mut engine = ApplyEngine::new();
//! engine.startup()?;
//! engine.add_rule(
//!     "Dependency",
//!     "Host",
//!     RuleDefinition::new(
//!         "db",
//!         Expression::set_literal("parent_host_name", "db1"),
//!         Expression::host_name_is("web1"),
//!     ),
//! )?;
//!
//! engine.run_apply_pass(vec![Checkable::from(Host::new("web1"))], ApplyPassConfig::default())?;
//! engine.check_matches(false);
//!
//! let pipeline = CommitPipeline::new(CommitConfig::new("/var/lib/confapply/objects"))?;
//! engine.commit(&pipeline, lock)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Values, expressions and the objects rules are matched against
pub mod debug_info;
pub mod error;
pub mod expression;
pub mod frame;
pub mod objects;
pub mod value;

// Rules and their expansion
pub mod apply;
pub mod engine;
pub mod loader;

// Commit to disk and cross-process coordination
pub mod config;
pub mod ipc;
pub mod storage;

pub use apply::{
    ApplyKind, ApplyPass, ApplyPassConfig, ApplyPassSummary, ApplyRule, ApplyRuleStore, DependencyKind,
    RuleDefinition, RuleId, ServiceKind, TemplateExpander, TypeRegistry,
};
pub use config::{
    CommitConfig, CommitPipeline, CommitSummary, ConfigCompilerContext, ConfigItem, ConfigItemBuilder,
    ItemRegistry,
};
pub use debug_info::DebugInfo;
pub use engine::ApplyEngine;
pub use error::{ApplyError, ApplyResult, ConfigError, EvaluationError, StorageError};
pub use expression::Expression;
pub use frame::ScriptFrame;
pub use ipc::{ConfigObjectsLock, ExclusiveGuard, SharedGuard};
pub use loader::DeferredInitializers;
pub use objects::{Checkable, Host, Service};
pub use storage::{read_objects_file, AtomicFile, ObjectRecord};
pub use value::{Dictionary, Value};
