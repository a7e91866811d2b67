//! Unified application error model and mapping helpers.
//! `AppError` is the common error enum shared by the HTTP handlers and the
//! account/directory stores; `OperationError` is the failure type wrapped
//! business operations hand to the response dispatcher.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

/// Failure raised by an operation wrapped in `handle_crud_operation`.
/// Carries the user-facing message, a per-field error map for validation
/// failures, and the HTTP status the API envelope should use (default 400).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
    errors: HashMap<String, String>,
    status: u16,
}

impl OperationError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into(), errors: HashMap::new(), status: 400 }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(message).with_status(500)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Attach a field-level validation error.
    pub fn field<K: Into<String>, V: Into<String>>(mut self, name: K, msg: V) -> Self {
        self.errors.insert(name.into(), msg.into());
        self
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn errors(&self) -> &HashMap<String, String> { &self.errors }
    pub fn status(&self) -> u16 { self.status }
}

impl From<AppError> for OperationError {
    fn from(err: AppError) -> Self {
        OperationError::new(err.message()).with_status(err.http_status())
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        OperationError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "blocked").http_status(), 403);
        assert_eq!(AppError::io("io", "io").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn operation_error_defaults_and_fields() {
        let e = OperationError::new("nombre requerido").field("nombre", "obligatorio");
        assert_eq!(e.status(), 400);
        assert_eq!(e.errors().get("nombre").map(String::as_str), Some("obligatorio"));

        let e = OperationError::internal("boom");
        assert_eq!(e.status(), 500);
        assert!(e.errors().is_empty());
    }

    #[test]
    fn operation_error_from_app_error_keeps_status() {
        let e: OperationError = AppError::not_found("nf", "no existe").into();
        assert_eq!(e.status(), 404);
        assert_eq!(e.message(), "no existe");
    }
}
