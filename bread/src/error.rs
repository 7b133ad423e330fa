//! Error taxonomy for configuration, resolution, storage and requests.
//!
//! - [`ValidationError`]: bad static configuration. Fatal at startup.
//! - [`ResolveError`]: per-record field resolution failures.
//! - [`BadRequest`]: malformed runtime input. Always surfaced as a client error.
//! - [`StorageError`]: failures reported by the storage layer.

use thiserror::Error as ThisError;

///
/// ValidationError
///
/// Raised while building a [`crate::scaffold::Bread`] from configuration.
///
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ValidationError {
    #[error("There is no field or attribute named '{name}' on model '{model}'")]
    NoSuchField { model: String, name: String },

    #[error(
        "On model '{model}', '{segment}' is not a key field, but the field spec tries to refer through it to '{rest}'."
    )]
    NotALink {
        model: String,
        segment: String,
        rest: String,
    },

    #[error(
        "On model '{model}', '{segment}' is not a field, but the field spec tries to refer through it to '{rest}'."
    )]
    NotAField {
        model: String,
        segment: String,
        rest: String,
    },

    #[error(
        "On model '{model}', '{method}' is callable and has required arguments; it is not valid to use in a field spec"
    )]
    RequiredArguments { model: String, method: String },

    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("search field '{path}' on model '{model}' is not searchable: {reason}")]
    NotSearchable {
        model: String,
        path: String,
        reason: String,
    },

    #[error("the {view} view requires permission '{codename}' but the model does not define it")]
    MissingPermission { view: String, codename: String },

    #[error("unknown view letter '{letter}' (expected some of B, R, E, A, D)")]
    UnknownView { letter: char },

    #[error("{0}")]
    Invalid(String),
}

///
/// ResolveError
///
/// Failures while walking a field spec over record instances.
///
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ResolveError {
    #[error("there is no field or attribute named '{attribute}' on {record}")]
    NoSuchField { record: String, attribute: String },

    #[error("'{method}' on {record} has required arguments and cannot be resolved")]
    MethodRequiresArguments { record: String, method: String },

    #[error("{model} matching id {id} does not exist")]
    RecordNotFound { model: String, id: i64 },

    #[error("'{method}' on {record} failed: {reason}")]
    Method {
        record: String,
        method: String,
        reason: String,
    },
}

impl ResolveError {
    /// Backing lookup failures propagate to the caller; everything else may be
    /// suppressed when rendering a cell.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, ResolveError::RecordNotFound { .. })
    }
}

///
/// BadRequest
///
/// Malformed or out-of-range request input (`o`, form data).
///
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct BadRequest {
    pub message: String,
}

impl BadRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

///
/// StorageError
///
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StorageError {
    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("{model} matching id {id} does not exist")]
    NotFound { model: String, id: i64 },

    /// The storage layer cannot compile a query against the schema.
    #[error("{0}")]
    Field(String),

    #[error("{0}")]
    Invalid(String),
}
