//! Security error taxonomy
//!
//! None of these are retried: a rejected input stays rejected until the
//! caller sends a different one.

use thiserror::Error;

use super::types::{InputKind, RiskLevel};

/// Sanitization failures. The operation never reaches the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("Injection rejected in {kind}: {reason}")]
    Injection { kind: InputKind, reason: String },

    #[error("Path traversal rejected: '{path}' escapes root '{root}'")]
    PathTraversal { path: String, root: String },

    #[error("Invalid {kind}: '{value}'")]
    InvalidIdentifier { kind: String, value: String },

    #[error("Empty {0}")]
    Empty(InputKind),
}

impl SanitizeError {
    pub(crate) fn injection(kind: InputKind, reason: impl Into<String>) -> Self {
        SanitizeError::Injection {
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(kind: impl ToString, value: impl Into<String>) -> Self {
        SanitizeError::InvalidIdentifier {
            kind: kind.to_string(),
            value: value.into(),
        }
    }
}

/// A command classified as critical. There is no override path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Blocked {risk} operation ({category}): {description} [command: {command}]")]
pub struct SecurityPolicyError {
    pub risk: RiskLevel,
    pub category: String,
    pub description: String,
    pub command: String,
}

/// A confirmation token that does not authorize the current operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("Malformed confirmation token")]
    Malformed,

    #[error("Confirmation token expired, request a new one")]
    Expired,

    #[error("Confirmation token was issued for a different operation")]
    Mismatch,
}

/// Why the gateway refused an operation before it reached the device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    #[error(transparent)]
    Policy(#[from] SecurityPolicyError),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}
