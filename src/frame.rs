//! Evaluation frames.

use crate::value::{Dictionary, Value};

/// Variables visible to an expression while it is evaluated.
///
/// `locals` hold the rule's captured scope plus bound names such as `host`,
/// `service` and loop variables. `this` is the object under construction,
/// present only while a config item body runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptFrame {
    /// Local variables.
    pub locals: Dictionary,
    /// The object whose fields assignments write to.
    pub this: Option<Dictionary>,
}

impl ScriptFrame {
    /// Creates an empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frame whose locals start as a copy of `scope`.
    #[must_use]
    pub fn with_locals(scope: &Dictionary) -> Self {
        Self {
            locals: scope.clone(),
            this: None,
        }
    }

    /// Binds a local variable, replacing any previous binding.
    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(name.into(), value.into());
    }

    /// Looks a name up in the locals first, then in the fields of `this`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .get(name)
            .or_else(|| self.this.as_ref().and_then(|this| this.get(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locals_shadow_this() {
        let mut frame = ScriptFrame::new();
        let mut this = Dictionary::new();
        this.insert("zone".to_string(), Value::from("master"));
        this.insert("name".to_string(), Value::from("obj"));
        frame.this = Some(this);
        frame.set_local("name", "local");

        assert_eq!(frame.lookup("name"), Some(&Value::from("local")));
        assert_eq!(frame.lookup("zone"), Some(&Value::from("master")));
        assert_eq!(frame.lookup("missing"), None);
    }
}
