//! Error types for the OAuth token provider.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Protocol errors ([`ServiceError`]) are kept apart from infrastructure faults
//! ([`InfrastructureError`]) so the endpoint layer never mistakes a storage outage for
//! a bad token.

use std::fmt;

use crate::models::RequestTokenStatus;

/// Category of a protocol-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ClientNotFound,
    ClientDisabled,
    PermissionNotAllowed,
    UnknownPermission,
    TokenNotFound,
    TokenExpired,
    InvalidTokenState,
    VerifierMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClientNotFound => "ClientNotFoundError",
            Self::ClientDisabled => "ClientDisabledError",
            Self::PermissionNotAllowed => "PermissionNotAllowedError",
            Self::UnknownPermission => "UnknownPermissionError",
            Self::TokenNotFound => "TokenNotFoundError",
            Self::TokenExpired => "TokenExpiredError",
            Self::InvalidTokenState => "InvalidTokenStateError",
            Self::VerifierMismatch => "VerifierMismatchError",
        };
        f.write_str(name)
    }
}

/// Caller or protocol errors. Never retried; surfaced unchanged to the endpoint layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No client registered under this identifier
    #[error("Client not found: {client_id}")]
    ClientNotFound {
        /// Requested consumer key
        client_id: String,
    },

    /// Client exists but has been administratively deactivated
    #[error("Client is disabled: {client_id}")]
    ClientDisabled {
        /// Consumer key of the disabled client
        client_id: String,
    },

    /// Requested permission is outside the client's pre-authorized set
    #[error("Permission '{permission}' is not allowed for client {client_id}")]
    PermissionNotAllowed {
        /// Consumer key of the requesting client
        client_id: String,
        /// First offending permission
        permission: String,
    },

    /// Permission identifier is absent from the catalog
    #[error("Unknown permission: {permission}")]
    UnknownPermission {
        /// Unrecognized identifier
        permission: String,
    },

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token expired")]
    TokenExpired,

    /// Lifecycle transition attempted from the wrong state
    #[error("Invalid token state: expected {expected}, found {actual}")]
    InvalidTokenState {
        /// State the operation requires
        expected: RequestTokenStatus,
        /// State found in the store
        actual: RequestTokenStatus,
    },

    #[error("Verifier does not match")]
    VerifierMismatch,
}

impl ServiceError {
    #[must_use]
    pub fn client_not_found(client_id: impl Into<String>) -> Self {
        Self::ClientNotFound {
            client_id: client_id.into(),
        }
    }

    #[must_use]
    pub fn client_disabled(client_id: impl Into<String>) -> Self {
        Self::ClientDisabled {
            client_id: client_id.into(),
        }
    }

    #[must_use]
    pub fn permission_not_allowed(
        client_id: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self::PermissionNotAllowed {
            client_id: client_id.into(),
            permission: permission.into(),
        }
    }

    #[must_use]
    pub fn unknown_permission(permission: impl Into<String>) -> Self {
        Self::UnknownPermission {
            permission: permission.into(),
        }
    }

    #[must_use]
    pub const fn invalid_state(expected: RequestTokenStatus, actual: RequestTokenStatus) -> Self {
        Self::InvalidTokenState { expected, actual }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ClientNotFound { .. } => ErrorKind::ClientNotFound,
            Self::ClientDisabled { .. } => ErrorKind::ClientDisabled,
            Self::PermissionNotAllowed { .. } => ErrorKind::PermissionNotAllowed,
            Self::UnknownPermission { .. } => ErrorKind::UnknownPermission,
            Self::TokenNotFound => ErrorKind::TokenNotFound,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::InvalidTokenState { .. } => ErrorKind::InvalidTokenState,
            Self::VerifierMismatch => ErrorKind::VerifierMismatch,
        }
    }

    /// OAuth 1.0 Problem Reporting code for this error.
    #[must_use]
    pub const fn oauth_problem(&self) -> &'static str {
        match self {
            Self::ClientNotFound { .. } => "consumer_key_unknown",
            Self::ClientDisabled { .. } => "consumer_key_rejected",
            Self::PermissionNotAllowed { .. } => "permission_denied",
            Self::UnknownPermission { .. } => "parameter_rejected",
            Self::TokenNotFound | Self::VerifierMismatch => "token_rejected",
            Self::TokenExpired => "token_expired",
            Self::InvalidTokenState {
                actual: RequestTokenStatus::Pending,
                ..
            } => "permission_unknown",
            Self::InvalidTokenState { .. } => "token_used",
        }
    }
}

/// Faults in the machinery underneath the state machine.
#[derive(thiserror::Error, Debug)]
pub enum InfrastructureError {
    /// Backing store unreachable or failed mid-operation
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// The OS random source failed
    #[error("Entropy source failure: {0}")]
    Entropy(#[from] rand::Error),

    /// A freshly generated key is already live. Treated as an invariant violation.
    #[error("Generated token key collides with a live token")]
    KeyCollision,

    /// Issue time plus the configured lifetime is not a representable instant
    #[error("Token lifetime {lifetime} overflows the expiry timestamp")]
    LifetimeOverflow {
        /// Offending lifetime
        lifetime: chrono::Duration,
    },
}

impl InfrastructureError {
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// Every failure the provider can return.
#[derive(thiserror::Error, Debug)]
pub enum OAuthError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

impl OAuthError {
    /// Protocol error kind, or `None` for infrastructure faults.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Service(err) => Some(err.kind()),
            Self::Infrastructure(_) => None,
        }
    }

    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// OAuth 1.0 Problem Reporting code. Infrastructure faults have none.
    #[must_use]
    pub const fn oauth_problem(&self) -> Option<&'static str> {
        match self {
            Self::Service(err) => Some(err.oauth_problem()),
            Self::Infrastructure(_) => None,
        }
    }
}

/// Failures of the administrative registration surface.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("Invalid {field} URL: {source}")]
    InvalidUrl {
        /// Which field carried the bad URL
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Client already registered: {0}")]
    DuplicateClient(String),

    #[error("Client not registered: {0}")]
    UnknownClient(String),
}

/// Result type alias for provider operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

/// Result type alias for raw store operations.
pub type StoreResult<T> = Result<T, InfrastructureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_through_oauth_error() {
        let err: OAuthError = ServiceError::client_not_found("c1").into();
        assert_eq!(err.kind(), Some(ErrorKind::ClientNotFound));
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn test_infrastructure_has_no_kind() {
        let err: OAuthError = InfrastructureError::storage("connection reset").into();
        assert_eq!(err.kind(), None);
        assert_eq!(err.oauth_problem(), None);
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_invalid_state_problem_codes() {
        let pending = ServiceError::invalid_state(
            RequestTokenStatus::Authorized,
            RequestTokenStatus::Pending,
        );
        assert_eq!(pending.oauth_problem(), "permission_unknown");

        let consumed = ServiceError::invalid_state(
            RequestTokenStatus::Authorized,
            RequestTokenStatus::Consumed,
        );
        assert_eq!(consumed.oauth_problem(), "token_used");
    }

    #[test]
    fn test_kind_display_uses_contract_names() {
        assert_eq!(
            ErrorKind::VerifierMismatch.to_string(),
            "VerifierMismatchError"
        );
    }
}
