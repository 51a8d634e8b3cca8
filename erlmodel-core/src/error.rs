//! Error types for model operations

use serde::Serialize;
use std::path::PathBuf;

/// Structured error payload for machine-readable output.
///
/// Printed by the CLI in `--json` mode.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: String,
}

impl ErrorEnvelope {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }
}

/// A structure build that did not complete.
///
/// Cloneable so a single failed build can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot build structure of {element}: {reason}")]
pub struct BuildFailure {
    pub element: String,
    pub reason: String,
}

impl BuildFailure {
    pub fn new(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            reason: reason.into(),
        }
    }
}

/// A change listener that failed while handling a notification.
///
/// Reported through a `FailureReporter`, never returned to the notifier's caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("listener {listener} failed on {element}: {message}")]
pub struct ListenerFailure {
    pub listener: String,
    pub element: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    StructureBuild(#[from] BuildFailure),

    #[error("Recursive build of {element} while it is being built")]
    ReentrantBuild { element: String },

    #[error("Invalid handle memento: {0}")]
    InvalidMemento(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Project properties error in {project}: {message}")]
    ProjectProperties { project: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Machine-readable form of this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (code, hint) = match self {
            Self::StructureBuild(_) => ("structure_build", "Check that the resource exists and is readable"),
            Self::ReentrantBuild { .. } => ("reentrant_build", "Do not open an element from inside its own build"),
            Self::InvalidMemento(_) => ("invalid_memento", "Mementos look like =project{module^fun/2"),
            Self::Pattern(_) => ("pattern", "Module patterns are globs, function patterns are regexes"),
            Self::ConfigParse(_) => ("config_parse", "Fix erlmodel.toml or delete it to use defaults"),
            Self::ConfigExists(_) => ("config_exists", "Edit the existing erlmodel.toml instead"),
            Self::ProjectProperties { .. } => ("project_properties", "Fix the project marker file"),
            Self::Io(_) => ("io", ""),
            Self::Serialization(_) => ("serialization", ""),
        };
        ErrorEnvelope::new(code, self.to_string(), hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_converts() {
        let err: ModelError = BuildFailure::new("=app", "no such project").into();
        assert!(matches!(err, ModelError::StructureBuild(_)));
        assert_eq!(
            err.to_string(),
            "cannot build structure of =app: no such project"
        );
    }

    #[test]
    fn test_envelope_codes() {
        let err = ModelError::Pattern("unclosed class".to_string());
        let envelope = err.envelope();
        assert_eq!(envelope.code, "pattern");
        assert!(envelope.message.contains("unclosed class"));
    }
}
