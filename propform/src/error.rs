//! Error types shared across the form runtime.

use thiserror::Error;

use crate::{data::schema::SchemaError, workflow::WorkflowState};

/// Errors surfaced by form sessions, the validator, lookups and the workflow.
#[derive(Debug, Error)]
pub enum FormError {
    /// A schema named by the form is unknown to the schema store.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// The schema could not be compiled; fatal for that schema's panel only.
    #[error("Schema '{schema}' could not be compiled: {message}")]
    SchemaCompile { schema: String, message: String },

    /// Schema document could not be parsed at all.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A dependent lookup failed. Transient; the model is left untouched.
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// The persistence service rejected the payload.
    #[error("Submission rejected: {}", .0.join("; "))]
    Submission(Vec<String>),

    /// No model node exists at the given path.
    #[error("No field at path: {0}")]
    UnknownPath(String),

    /// The path exists but does not address the expected kind of node.
    #[error("Field at {path} is not {expected}")]
    WrongNodeKind { path: String, expected: &'static str },

    /// An array edit would leave the array outside `[minItems, maxItems]`.
    #[error("Cannot change items of {path}: {reason}")]
    Cardinality { path: String, reason: String },

    /// The requested workflow action is not offered in the current state.
    #[error("Action '{action}' is not available while {from}")]
    InvalidTransition {
        from: WorkflowState,
        action: &'static str,
    },

    /// Destructive actions must be confirmed explicitly.
    #[error("Deleting requires explicit confirmation")]
    ConfirmationRequired,

    /// The session was closed; no further edits are accepted.
    #[error("Form session is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FormError>;

/// Schema/data shape mismatch found while building a model tree.
///
/// Recovered by treating the data as absent; logged, never shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralAnomaly {
    /// Model path where the mismatch was found.
    pub path: String,
    /// Expected JSON shape according to the schema.
    pub expected: &'static str,
    /// What the stored data actually contained.
    pub actual: String,
}

impl std::fmt::Display for StructuralAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.path, self.expected, self.actual
        )
    }
}
