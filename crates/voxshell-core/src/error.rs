//! Error types for VoxShell Core
//!
//! Only loading failures are errors in the `Result` sense. Everything that can
//! go wrong with a single utterance (no match, missing slot, rejection,
//! declined confirmation) is a normal return value of the pipeline, so the
//! interaction loop never dies on one bad request.

use thiserror::Error;

use crate::intent::{IntentId, OsFamily};

/// Result type alias for VoxShell operations
pub type Result<T> = std::result::Result<T, VoxError>;

/// Main error type for VoxShell operations
#[derive(Error, Debug)]
pub enum VoxError {
    /// Intent library could not be loaded or failed validation
    #[error("Intent library error: {0}")]
    Library(#[from] LibraryError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template rendering failed
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<VoxError>,
    },
}

/// Errors raised while loading or validating an intent library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Intent library is empty")]
    Empty,

    #[error("Duplicate intent id: {0}")]
    DuplicateId(IntentId),

    #[error("Intent {0} has no command template")]
    NoTemplate(IntentId),

    #[error("Intent {0} has no trigger pattern")]
    NoTrigger(IntentId),

    #[error("Invalid trigger pattern for {intent}: {message}")]
    InvalidPattern { intent: IntentId, message: String },

    #[error("Template for {intent} references undeclared slot {{{slot}}}")]
    UnknownPlaceholder { intent: IntentId, slot: String },

    #[error("Slot rule for {intent} captures group {group:?}, which no trigger defines")]
    UnknownCaptureGroup { intent: IntentId, group: String },

    #[error("Template program for {intent} must be a literal, got {program:?}")]
    DynamicProgram { intent: IntentId, program: String },

    #[error("Example {example:?} of {intent} resolves to {actual}")]
    ShadowedExample {
        intent: IntentId,
        example: String,
        actual: String,
    },

    #[error("Failed to parse intent library: {0}")]
    Parse(String),
}

/// Errors raised while loading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid deny pattern {pattern:?}: {message}")]
    InvalidDenyPattern { pattern: String, message: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors raised while rendering a command template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Intent {intent} has no template for {os}")]
    UnsupportedOnThisOs { intent: IntentId, os: OsFamily },

    #[error("Slot {slot} contains template syntax or an option prefix")]
    TemplateInjection { slot: String },
}

impl From<toml::de::Error> for LibraryError {
    fn from(e: toml::de::Error) -> Self {
        LibraryError::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(e: serde_json::Error) -> Self {
        LibraryError::Parse(e.to_string())
    }
}

impl VoxError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<VoxError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = VoxError::from(LibraryError::Empty);
        let err = err.context("Failed to load intents.toml");

        let text = err.to_string();
        assert!(text.contains("Failed to load intents.toml"));
        assert!(text.contains("empty"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), LibraryError> =
            Err(LibraryError::DuplicateId(IntentId::CreateFolder));
        let result = result.context("Library validation failed");

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Library validation failed"));
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::UnsupportedOnThisOs {
            intent: IntentId::SystemInfo,
            os: OsFamily::Windows,
        };
        assert_eq!(err.to_string(), "Intent system_info has no template for windows");
    }
}
