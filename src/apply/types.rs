//! Legal source → target type relationships for apply rules.

use std::collections::HashMap;

use crate::error::ConfigError;

/// Maps an apply source type (e.g. `Dependency`) to the object types its
/// rules may target (e.g. `Host`, `Service`), in registration order.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the target types of `source_type`, replacing any earlier
    /// registration.
    pub fn register_type<I, S>(&mut self, source_type: impl Into<String>, target_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.insert(
            source_type.into(),
            target_types.into_iter().map(Into::into).collect(),
        );
    }

    /// Whether `source_type` was registered.
    #[must_use]
    pub fn is_valid_source_type(&self, source_type: &str) -> bool {
        self.types.contains_key(source_type)
    }

    /// An empty `target_type` is valid exactly when the source type has a
    /// single legal target.
    #[must_use]
    pub fn is_valid_target_type(&self, source_type: &str, target_type: &str) -> bool {
        let Some(targets) = self.types.get(source_type) else {
            return false;
        };

        if target_type.is_empty() {
            return targets.len() == 1;
        }

        targets.iter().any(|t| t == target_type)
    }

    /// Legal targets of `source_type`; empty if it is not registered.
    #[must_use]
    pub fn target_types(&self, source_type: &str) -> &[String] {
        self.types.get(source_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolves a possibly empty target type to the concrete one rules are
    /// indexed under.
    ///
    /// # Errors
    /// - `UnknownSourceType` if `source_type` was never registered
    /// - `AmbiguousTargetType` if `target_type` is empty and there are
    ///   several candidates
    /// - `InvalidTargetType` if `target_type` is not a legal target
    pub fn resolve_target_type(&self, source_type: &str, target_type: &str) -> Result<String, ConfigError> {
        let Some(targets) = self.types.get(source_type) else {
            return Err(ConfigError::UnknownSourceType {
                source_type: source_type.to_string(),
            });
        };

        if target_type.is_empty() {
            return match targets.as_slice() {
                [only] => Ok(only.clone()),
                _ => Err(ConfigError::AmbiguousTargetType {
                    source_type: source_type.to_string(),
                    candidates: targets.clone(),
                }),
            };
        }

        if targets.iter().any(|t| t == target_type) {
            Ok(target_type.to_string())
        } else {
            Err(ConfigError::InvalidTargetType {
                source_type: source_type.to_string(),
                target_type: target_type.to_string(),
            })
        }
    }
}
