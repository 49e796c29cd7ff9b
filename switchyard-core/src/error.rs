use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Response header carrying the domain error code on guarded rejections.
pub const ERROR_CODE_HEADER: &str = "x-request-error";

/// Domain error codes. Distinguish rejections that share an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Internal,
    Forbidden,
    Denied,
    Blacklisted,
    NotFound,
    TokenExpired,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "0500",
            ErrorCode::Forbidden => "0403",
            ErrorCode::Denied => "0401",
            ErrorCode::Blacklisted => "0404",
            ErrorCode::NotFound => "0405",
            ErrorCode::TokenExpired => "0406",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for Switchyard.
#[derive(Error, Debug)]
pub enum SwitchyardError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Route already exists: {method} {path}")]
    DuplicateRoute { method: String, path: String },

    #[error("Invalid route {path}: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("Unknown middleware: {0}")]
    UnknownMiddleware(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

/// JSON error envelope shared by every structured rejection.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub success: bool,
    pub message: &'a str,
    pub errors: Option<&'a Value>,
    pub status_code: u16,
}

impl SwitchyardError {
    /// Map to HTTP status code. Every remaining variant is a startup or
    /// internal failure.
    pub fn status_code(&self) -> u16 {
        500
    }

    /// Domain code for the `x-request-error` header, when the error has one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            SwitchyardError::Serde(_) | SwitchyardError::Internal(_) => Some(ErrorCode::Internal),
            _ => None,
        }
    }

    /// JSON error body.
    pub fn to_json_body(&self) -> Vec<u8> {
        envelope_body(self.status_code(), &self.to_string(), None)
    }
}

/// Render the error envelope. Falls back to a fixed body if encoding fails.
pub fn envelope_body(status_code: u16, message: &str, errors: Option<&Value>) -> Vec<u8> {
    let envelope = ErrorEnvelope {
        success: false,
        message,
        errors,
        status_code,
    };
    serde_json::to_vec(&envelope).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode error envelope");
        FALLBACK_BODY.to_vec()
    })
}

pub(crate) const FALLBACK_BODY: &[u8] =
    br#"{"success":false,"message":"Internal server error","errors":null,"status_code":500}"#;
