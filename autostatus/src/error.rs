//! AutoStatus error types
//!
//! Structured errors for the timer API and the collaborator seams.
//! Rule-evaluation guards never produce errors; see [`crate::evaluator::SkipReason`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::timer::SubjectKind;

/// Result type alias for autostatus operations
pub type AutoStatusResult<T> = Result<T, AutoStatusError>;

/// Serializable error payload returned across the timer RPC boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code (e.g., "ALREADY_RUNNING")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Identifiers relevant to the failure
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl StructuredError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Add context key-value pair
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Errors that can occur during autostatus operations
#[derive(Error, Debug)]
pub enum AutoStatusError {
    /// Ticket, task or other subject does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Caller may not start or stop this timer
    #[error("User {user_id} is not allowed to {action} the timer on {kind} {subject_id}")]
    PermissionDenied {
        user_id: i64,
        action: &'static str,
        kind: SubjectKind,
        subject_id: i64,
    },

    /// Malformed action or subject kind on the timer API
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// A session for this subject and owner is already running
    #[error("Timer already running on {kind} {subject_id} for user {user_id}")]
    AlreadyRunning {
        kind: SubjectKind,
        subject_id: i64,
        user_id: i64,
    },

    /// Stop requested but nothing is running on the subject
    #[error("No running timer on {kind} {subject_id}")]
    NoRunningSession { kind: SubjectKind, subject_id: i64 },

    /// A host collaborator (repository, store) failed
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Configuration could not be read or written
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutoStatusError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Self::NoRunningSession { .. } => "NO_RUNNING_SESSION",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether this error must abort the host request.
    ///
    /// State-machine precondition failures are answered in-band; collaborator
    /// failures propagate to the host untouched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Config { .. } | Self::Io(_) | Self::Json(_)
        )
    }

    /// Short user-facing message used by the timer API.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } => "Item not found".to_string(),
            Self::PermissionDenied { .. } => "Permission denied".to_string(),
            Self::InvalidRequest { .. } => "Invalid request".to_string(),
            Self::AlreadyRunning { .. } => "Timer already running".to_string(),
            Self::NoRunningSession { .. } => "No running timer".to_string(),
            other => other.to_string(),
        }
    }

    /// Convert to structured error for RPC responses
    pub fn to_structured(&self) -> StructuredError {
        let structured = StructuredError::new(self.code(), self.to_string());
        match self {
            Self::NotFound { entity, id } => structured
                .with_context("entity", *entity)
                .with_context("id", *id),
            Self::PermissionDenied {
                user_id,
                kind,
                subject_id,
                ..
            } => structured
                .with_context("user_id", *user_id)
                .with_context("subject_kind", kind.as_str())
                .with_context("subject_id", *subject_id),
            Self::AlreadyRunning {
                kind,
                subject_id,
                user_id,
            } => structured
                .with_context("user_id", *user_id)
                .with_context("subject_kind", kind.as_str())
                .with_context("subject_id", *subject_id),
            Self::NoRunningSession { kind, subject_id } => structured
                .with_context("subject_kind", kind.as_str())
                .with_context("subject_id", *subject_id),
            _ => structured,
        }
    }
}
