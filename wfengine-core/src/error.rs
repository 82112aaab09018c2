//! Core error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("workflow definition with id '{definition_id}' already exists")]
    DuplicateDefinitionId { definition_id: String },

    #[error("a workflow definition must have exactly one initial state. Found {found}.")]
    InvalidInitialStateCount { found: usize },

    #[error("state id '{state}' is declared more than once")]
    DuplicateStateId { state: String },

    #[error("action id '{action}' is declared more than once")]
    DuplicateActionId { action: String },

    #[error("action '{action}' references unknown state '{state}'")]
    UnknownStateReference { action: String, state: String },

    #[error("workflow definition with id '{definition_id}' not found")]
    DefinitionNotFound { definition_id: String },

    #[error("workflow instance '{instance_id}' not found")]
    InstanceNotFound { instance_id: Uuid },

    #[error("definition '{definition_id}' for instance '{instance_id}' is missing")]
    DefinitionMissing {
        instance_id: Uuid,
        definition_id: String,
    },

    #[error("action rejected: instance is in final state '{state}'")]
    InstanceInFinalState { state: String },

    #[error("action '{action}' not found in the workflow definition")]
    ActionNotFound { action: String },

    #[error("action '{action}' is disabled")]
    ActionDisabled { action: String },

    #[error("action '{action}' cannot be executed from the current state '{state}'")]
    InvalidSourceState { action: String, state: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },
}

/// Stable error codes, one per error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DuplicateDefinitionId,
    InvalidInitialStateCount,
    DuplicateStateId,
    DuplicateActionId,
    UnknownStateReference,
    DefinitionNotFound,
    InstanceNotFound,
    DefinitionMissing,
    InstanceInFinalState,
    ActionNotFound,
    ActionDisabled,
    InvalidSourceState,
    StorageError,
}

/// Boundary classification of an error kind.
///
/// Transports translate a class into their own status vocabulary; the
/// classification itself never depends on the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// An identity the caller supplied does not resolve.
    NotFound,
    /// The request was well-formed but is not legal right now.
    ClientError,
    /// The engine's own invariants are broken.
    Internal,
}

impl CoreError {
    /// Returns the stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::DuplicateDefinitionId { .. } => ErrorCode::DuplicateDefinitionId,
            CoreError::InvalidInitialStateCount { .. } => ErrorCode::InvalidInitialStateCount,
            CoreError::DuplicateStateId { .. } => ErrorCode::DuplicateStateId,
            CoreError::DuplicateActionId { .. } => ErrorCode::DuplicateActionId,
            CoreError::UnknownStateReference { .. } => ErrorCode::UnknownStateReference,
            CoreError::DefinitionNotFound { .. } => ErrorCode::DefinitionNotFound,
            CoreError::InstanceNotFound { .. } => ErrorCode::InstanceNotFound,
            CoreError::DefinitionMissing { .. } => ErrorCode::DefinitionMissing,
            CoreError::InstanceInFinalState { .. } => ErrorCode::InstanceInFinalState,
            CoreError::ActionNotFound { .. } => ErrorCode::ActionNotFound,
            CoreError::ActionDisabled { .. } => ErrorCode::ActionDisabled,
            CoreError::InvalidSourceState { .. } => ErrorCode::InvalidSourceState,
            CoreError::Storage { .. } => ErrorCode::StorageError,
        }
    }

    /// Returns the boundary class for this error.
    pub fn class(&self) -> ErrorClass {
        self.code().class()
    }
}

impl ErrorCode {
    /// Identity-resolution failures are `NotFound`, broken invariants are
    /// `Internal`, everything else is a `ClientError`.
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorCode::DefinitionNotFound | ErrorCode::InstanceNotFound => ErrorClass::NotFound,
            ErrorCode::DefinitionMissing | ErrorCode::StorageError => ErrorClass::Internal,
            ErrorCode::DuplicateDefinitionId
            | ErrorCode::InvalidInitialStateCount
            | ErrorCode::DuplicateStateId
            | ErrorCode::DuplicateActionId
            | ErrorCode::UnknownStateReference
            | ErrorCode::InstanceInFinalState
            | ErrorCode::ActionNotFound
            | ErrorCode::ActionDisabled
            | ErrorCode::InvalidSourceState => ErrorClass::ClientError,
        }
    }

    /// Returns the wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateDefinitionId => "DUPLICATE_DEFINITION_ID",
            ErrorCode::InvalidInitialStateCount => "INVALID_INITIAL_STATE_COUNT",
            ErrorCode::DuplicateStateId => "DUPLICATE_STATE_ID",
            ErrorCode::DuplicateActionId => "DUPLICATE_ACTION_ID",
            ErrorCode::UnknownStateReference => "UNKNOWN_STATE_REFERENCE",
            ErrorCode::DefinitionNotFound => "DEFINITION_NOT_FOUND",
            ErrorCode::InstanceNotFound => "INSTANCE_NOT_FOUND",
            ErrorCode::DefinitionMissing => "DEFINITION_MISSING",
            ErrorCode::InstanceInFinalState => "INSTANCE_IN_FINAL_STATE",
            ErrorCode::ActionNotFound => "ACTION_NOT_FOUND",
            ErrorCode::ActionDisabled => "ACTION_DISABLED",
            ErrorCode::InvalidSourceState => "INVALID_SOURCE_STATE",
            ErrorCode::StorageError => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
