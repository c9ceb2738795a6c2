//! Global flow configuration.
//!
//! These settings travel inside the flow document and apply to the whole
//! flow rather than to a single node. They are opaque to the graph store and
//! only consulted by the execution engine and the host application.

use serde::{Deserialize, Serialize};

/// How aggressively the flow should be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Keep intermediate results around for inspection after every node.
    #[default]
    Development,
    /// Only materialize what output/preview nodes require.
    Performance,
}

/// Where the flow executes. Remote execution is a host concern; the engine
/// itself always runs in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLocation {
    #[default]
    Local,
    Remote,
}

/// Flow-level settings embedded in the flow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    pub description: String,
    pub execution_mode: ExecutionMode,
    pub execution_location: ExecutionLocation,
    pub auto_save: bool,
    pub show_detailed_progress: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            description: String::new(),
            execution_mode: ExecutionMode::default(),
            execution_location: ExecutionLocation::default(),
            auto_save: false,
            show_detailed_progress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = FlowSettings::default();
        assert_eq!(settings.execution_mode, ExecutionMode::Development);
        assert_eq!(settings.execution_location, ExecutionLocation::Local);
        assert!(!settings.auto_save);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let settings: FlowSettings =
            serde_yaml::from_str("execution_mode: performance").unwrap();
        assert_eq!(settings.execution_mode, ExecutionMode::Performance);
        assert!(settings.show_detailed_progress);
    }
}
