//! Error taxonomy shared by the client and its callers.

use thiserror::Error;

use crate::id::UserId;

/// Result type used across the admin panel core.
pub type AdminResult<T> = Result<T, AdminError>;

/// Closed set of failures an admin panel operation can report.
///
/// Callers branch on the variant: `Unauthenticated` means the session is gone
/// and the operator must log in again, everything else is displayable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// The backend rejected the submitted email/password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No credential is stored, or the backend rejected the stored one.
    #[error("not authenticated")]
    Unauthenticated,

    /// Network error, unexpected status, or undecodable response.
    #[error("transport failure{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    TransportFailure {
        status: Option<u16>,
        message: String,
    },

    /// The user id is not present in the locally cached list.
    #[error("user {0} not found")]
    NotFound(UserId),
}

impl AdminError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            status: None,
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::TransportFailure {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether this failure ends the session and requires a fresh login.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    /// HTTP status carried by a transport failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransportFailure { status, .. } => *status,
            _ => None,
        }
    }
}
