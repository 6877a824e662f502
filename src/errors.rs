use thiserror::Error;

use crate::constants::{
    MALFORMED_MSG, NOTHING_TO_BUY_MSG, NOT_FOUND_MSG, NO_PLAN_MSG, NO_USER_MSG, PERMISSION_MSG,
    UNAVAILABLE_MSG,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    NotAuthenticated,
    NotFound,
    NoPlan,
    NothingToPurchase,
    PermissionDenied,
    Unavailable,
    MalformedInput,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no dishes planned for {0}")]
    NoPlan(String),
    #[error("stock already covers every planned ingredient")]
    NothingToPurchase,
    #[error("user '{user}' may not {action}")]
    PermissionDenied { user: String, action: &'static str },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid input: {0}")]
    MalformedInput(String),
    #[error(transparent)]
    Document(#[from] DocumentParseError),
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl PlannerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PlannerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PlannerError::NotAuthenticated => ErrorCategory::NotAuthenticated,
            PlannerError::NotFound { .. } => ErrorCategory::NotFound,
            PlannerError::NoPlan(_) => ErrorCategory::NoPlan,
            PlannerError::NothingToPurchase => ErrorCategory::NothingToPurchase,
            PlannerError::PermissionDenied { .. } => ErrorCategory::PermissionDenied,
            PlannerError::Unavailable(_) => ErrorCategory::Unavailable,
            PlannerError::MalformedInput(_) | PlannerError::Document(_) => {
                ErrorCategory::MalformedInput
            }
            // busy, locked or corrupt: all of it reads as "store unreachable" to the user
            PlannerError::Storage(_) => ErrorCategory::Unavailable,
        }
    }

    /// The one message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self.category() {
            ErrorCategory::NotAuthenticated => NO_USER_MSG,
            ErrorCategory::NotFound => NOT_FOUND_MSG,
            ErrorCategory::NoPlan => NO_PLAN_MSG,
            ErrorCategory::NothingToPurchase => NOTHING_TO_BUY_MSG,
            ErrorCategory::PermissionDenied => PERMISSION_MSG,
            ErrorCategory::Unavailable => UNAVAILABLE_MSG,
            ErrorCategory::MalformedInput => MALFORMED_MSG,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentParseError {
    #[error("document '{0}' is not an object")]
    NotAnObject(String),
    #[error("document '{id}' is missing required field '{field}'")]
    MissingField { id: String, field: &'static str },
    #[error("document '{id}' has an invalid '{field}' field")]
    InvalidField { id: String, field: &'static str },
    #[error("stored json is unreadable: {0}")]
    Json(String),
}

impl From<serde_json::Error> for DocumentParseError {
    fn from(e: serde_json::Error) -> Self {
        DocumentParseError::Json(e.to_string())
    }
}
