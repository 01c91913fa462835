//! Source locations attached to rules and config items.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Location of a declaration in a configuration source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Source file path.
    pub path: String,
    /// First line (1-based).
    pub first_line: u32,
    /// First column (1-based).
    pub first_column: u32,
    /// Last line (1-based).
    pub last_line: u32,
    /// Last column (1-based).
    pub last_column: u32,
}

impl DebugInfo {
    /// Creates a location spanning the given lines and columns.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        first_line: u32,
        first_column: u32,
        last_line: u32,
        last_column: u32,
    ) -> Self {
        Self {
            path: path.into(),
            first_line,
            first_column,
            last_line,
            last_column,
        }
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in {}: {}:{}-{}:{}",
            self.path, self.first_line, self.first_column, self.last_line, self.last_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let di = DebugInfo::new("zones.d/deps.conf", 4, 1, 9, 2);
        assert_eq!(format!("{di}"), "in zones.d/deps.conf: 4:1-9:2");
    }
}
