//! Type definitions for simbld_access
//!
//! Contains the shared error types, the user-facing notice model and the
//! configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Fallback message for any failure that never reached a structured server answer.
pub const TRANSPORT_MESSAGE: &str =
    "Unable to reach the access service. Please check your connection and try again.";

/// Single message for every rejected MFA code, whatever the underlying cause.
pub const VERIFICATION_FAILED_MESSAGE: &str = "Invalid verification code. Please try again.";

/// Binary startup errors
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Server binding error: {0}")]
    ServerBind(String),
}

/// Errors raised by the access service client layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The connection could not be established, so nothing reached the server.
    #[error("Connection error: {0}")]
    Connect(String),

    /// The request was sent but no response came back (timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response without a structured body.
    #[error("Unexpected status {status}: {message}")]
    Status {
        status: u16,
        message: String,
    },

    /// A body was received but did not match the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Whether the failure happened before any response was received
    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Connect(_) | ServiceError::Transport(_))
    }
}

/// The kinds of request a controller can have in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    MfaStatus,
    MfaSetup,
    MfaVerify,
    MfaDisable,
    MfaRegenerate,
    EmergencyReasons,
    EmergencyRequest,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::MfaStatus => "MFA status",
            RequestKind::MfaSetup => "MFA setup",
            RequestKind::MfaVerify => "MFA verification",
            RequestKind::MfaDisable => "MFA disable",
            RequestKind::MfaRegenerate => "backup code regeneration",
            RequestKind::EmergencyReasons => "emergency reasons",
            RequestKind::EmergencyRequest => "emergency access request",
        };
        f.write_str(name)
    }
}

/// Outcome of a controller operation that did not succeed.
///
/// The `Display` text of each variant is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Incomplete or malformed input, caught before dispatch.
    #[error("{0}")]
    Validation(String),

    /// Well-formed request refused by the server; the message is the server's, verbatim.
    #[error("{0}")]
    Denied(String),

    #[error("{}", TRANSPORT_MESSAGE)]
    Transport {
        detail: String,
    },

    #[error("{}", VERIFICATION_FAILED_MESSAGE)]
    VerificationFailed,

    #[error("{operation} is not available from the {step} step")]
    InvalidStep {
        operation: &'static str,
        step: String,
    },

    #[error("A {0} request is already in progress")]
    Busy(RequestKind),

    /// The controller was reset while the request was in flight.
    #[error("The dialog was closed before the request completed")]
    Discarded,

    #[error("There are no backup codes to export")]
    NothingToExport,
}

impl FlowError {
    pub fn transport(err: &ServiceError) -> Self {
        FlowError::Transport {
            detail: err.to_string(),
        }
    }

    /// Whether the user can simply try the same action again
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowError::Transport { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// User-facing notification produced at an operation boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub retryable: bool,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<&FlowError> for Notice {
    fn from(err: &FlowError) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AccessClientConfig {
    pub base_url: String,
    /// Bearer token of the authenticated session, if the service expects one.
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub endpoints: Endpoints,
    pub recent_patients_capacity: usize,
}

impl AccessClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bounded exponential backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
}

/// Logical routes of the access/identity service
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    pub mfa_status: String,
    pub mfa_setup_begin: String,
    pub mfa_verify_setup: String,
    pub mfa_disable: String,
    pub mfa_regenerate_backup_codes: String,
    pub emergency_reasons: String,
    pub emergency_request: String,
}

impl Endpoints {
    pub fn all(&self) -> [&str; 7] {
        [
            &self.mfa_status,
            &self.mfa_setup_begin,
            &self.mfa_verify_setup,
            &self.mfa_disable,
            &self.mfa_regenerate_backup_codes,
            &self.emergency_reasons,
            &self.emergency_request,
        ]
    }
}

impl Default for AccessClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            access_token: None,
            request_timeout_secs: 15,
            retry: RetryConfig::default(),
            endpoints: Endpoints::default(),
            recent_patients_capacity: 10,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 200,
            multiplier: 2.0,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            mfa_status: "/api/mfa/status".to_string(),
            mfa_setup_begin: "/api/mfa/setup/begin".to_string(),
            mfa_verify_setup: "/api/mfa/setup/verify".to_string(),
            mfa_disable: "/api/mfa/disable".to_string(),
            mfa_regenerate_backup_codes: "/api/mfa/backup-codes/regenerate".to_string(),
            emergency_reasons: "/api/emergency-access/reasons".to_string(),
            emergency_request: "/api/emergency-access/request".to_string(),
        }
    }
}
