//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. Schema faults
//! have their own enum so the parser can report exactly what is wrong with
//! a template before anything runs.

use std::path::PathBuf;

use thiserror::Error;

/// Structural problems found while turning a template document into a
/// [`Template`](crate::workflow::Template).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Failed to parse template YAML: {0}")]
    Yaml(String),

    #[error("Template must be a mapping with keys name, description, variables, steps")]
    NotAMapping,

    #[error("Template is missing a non-empty 'name'")]
    MissingName,

    #[error("Template has no steps")]
    MissingSteps,

    /// A field is unknown or of the wrong type; `message` comes from serde.
    #[error("Invalid {location}: {message}")]
    Invalid { location: String, message: String },

    #[error("Step {index} ('{name}') has no command specified")]
    EmptyCommand { index: usize, name: String },
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid template: {0}")]
    Schema(#[from] SchemaError),

    #[error("Undefined variable '{{{{{name}}}}}'")]
    UndefinedVariable { name: String },

    #[error("Cyclic variable reference: {}", .cycle.join(" -> "))]
    CyclicVariable { cycle: Vec<String> },

    #[error("Step {index} ('{name}') failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    StepExecution {
        index: usize,
        name: String,
        code: Option<i32>,
    },

    #[error("State record {} is unreadable: {reason}", .path.display())]
    StateCorruption { path: PathBuf, reason: String },

    #[error("Run interrupted by operator at step {index}")]
    Interrupted { index: usize },

    #[error("Could not read a value for '{name}': {source}")]
    Prompt {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read template '{}': {source}", .path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode state: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
