//! Error types for the request queue engine.
//!
//! Every failure carries enough structure for a boundary layer to pick a status
//! code and report the offending parameter. Nothing here is retried internally.

use std::fmt;
use thiserror::Error;

/// Result type alias using the queue error type.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Kind of entity a lookup failed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A request
    Request,
    /// An item
    Item,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("Request"),
            Self::Item => f.write_str("Item"),
        }
    }
}

/// Offending field or parameter of a rejected operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorParameter {
    /// Field name as exposed at the boundary (camelCase)
    pub key: String,
    /// Supplied value
    pub value: String,
}

/// Errors raised by external collaborators.
///
/// These pass through untouched and surface as server errors.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CollaboratorError {
    /// A policy record referenced by circulation rules does not exist
    #[error("{kind} policy not found: {id}")]
    PolicyNotFound {
        /// Policy family (request, loan, recall)
        kind: &'static str,
        /// Identifier that could not be resolved
        id: String,
    },

    /// The collaborator could not answer
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        /// Collaborator name
        collaborator: &'static str,
        /// Underlying cause
        reason: String,
    },
}

/// Main error type for queue operations.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The operation is not allowed in the current state (422)
    #[error("{message}")]
    Validation {
        /// Human-readable reason
        message: String,
        /// Offending fields
        parameters: Vec<ErrorParameter>,
    },

    /// Unknown request or item (404)
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up
        kind: EntityKind,
        /// Identifier that was not found
        id: String,
    },

    /// A status, type or preference string outside the known set
    #[error("Unknown {kind}: '{value}'")]
    UnknownValue {
        /// Which enumeration was being parsed
        kind: &'static str,
        /// The rejected string
        value: String,
    },

    /// Collaborator failure passed through (500)
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl QueueError {
    /// Validation failure without parameters
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            parameters: Vec::new(),
        }
    }

    /// Attach an offending parameter to a validation failure
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        if let Self::Validation { parameters, .. } = &mut self {
            parameters.push(ErrorParameter {
                key: key.into(),
                value: value.to_string(),
            });
        }
        self
    }

    /// Unknown request id
    #[must_use]
    pub fn request_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: EntityKind::Request,
            id: id.to_string(),
        }
    }

    /// Unknown item id
    #[must_use]
    pub fn item_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: EntityKind::Item,
            id: id.to_string(),
        }
    }

    /// Unparseable enumeration string
    #[must_use]
    pub fn unknown_value(kind: &'static str, value: &str) -> Self {
        Self::UnknownValue {
            kind,
            value: value.to_string(),
        }
    }

    /// Editing a request that is already closed
    #[must_use]
    pub fn closed_request(id: impl ToString) -> Self {
        Self::validation("Cannot edit a closed request").with_parameter("id", id)
    }

    /// HTTP status code a boundary layer should answer with
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::UnknownValue { .. } => 422,
            Self::NotFound { .. } => 404,
            Self::Collaborator(_) => 500,
        }
    }

    /// Offending parameters, if any
    #[must_use]
    pub fn parameters(&self) -> &[ErrorParameter] {
        match self {
            Self::Validation { parameters, .. } => parameters,
            _ => &[],
        }
    }

    /// Short label used for metrics and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::UnknownValue { .. } => "unknown_value",
            Self::Collaborator(_) => "collaborator",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(QueueError::validation("nope").http_status(), 422);
        assert_eq!(QueueError::item_not_found("x").http_status(), 404);
        let missing = CollaboratorError::PolicyNotFound {
            kind: "request",
            id: "abc".to_string(),
        };
        assert_eq!(QueueError::from(missing).http_status(), 500);
    }

    #[test]
    fn closed_request_error_names_the_request() {
        let err = QueueError::closed_request("r-1");
        assert_eq!(err.to_string(), "Cannot edit a closed request");
        assert_eq!(
            err.parameters(),
            &[ErrorParameter {
                key: "id".to_string(),
                value: "r-1".to_string()
            }]
        );
    }

    #[test]
    fn collaborator_errors_pass_through_unchanged() {
        let err = QueueError::from(CollaboratorError::PolicyNotFound {
            kind: "recall",
            id: "p-9".to_string(),
        });
        assert_eq!(err.to_string(), "recall policy not found: p-9");
        assert_eq!(err.kind(), "collaborator");
    }
}
