use crate::error::{Error, ErrorCode};

/// Classified authentication failures.
///
/// These are the only errors the session layer shows to a UI. They never
/// carry backend text, so presentation can map each kind to its own
/// localized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Wrong identifier or secret.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration with an identifier that already exists.
    #[error("Identifier already registered")]
    DuplicateIdentifier,

    /// The backend rejected the submitted fields.
    #[error("Validation failed")]
    ValidationError,

    /// Backend unreachable, timed out, or failed internally.
    #[error("Network or server error")]
    NetworkOrServerError,

    /// The session could not be renewed. Internal: callers demote to
    /// anonymous instead of showing this.
    #[error("Session expired")]
    SessionExpired,
}

impl AuthError {
    pub(crate) fn from_login(e: &Error) -> Self {
        if e.is_transport() {
            return Self::NetworkOrServerError;
        }
        match (e.code(), e.status()) {
            (Some(ErrorCode::InvalidCredentials), _) => Self::InvalidCredentials,
            (Some(ErrorCode::InvalidPayload | ErrorCode::FailedValidation), _) => {
                Self::InvalidCredentials
            }
            (None, Some(400 | 401 | 403)) => Self::InvalidCredentials,
            _ => Self::NetworkOrServerError,
        }
    }

    pub(crate) fn from_registration(e: &Error) -> Self {
        if e.is_transport() {
            return Self::NetworkOrServerError;
        }
        match (e.code(), e.status()) {
            (Some(ErrorCode::RecordNotUnique), _) | (_, Some(409)) => Self::DuplicateIdentifier,
            (_, Some(status)) if status >= 500 => Self::NetworkOrServerError,
            (_, Some(_)) => Self::ValidationError,
            (Some(_), None) => Self::ValidationError,
            (None, None) => Self::NetworkOrServerError,
        }
    }
}

/// Failure of a request made through
/// [`SessionManager::authorized`](super::SessionManager::authorized).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RequestError {
    /// No session; nothing was sent.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Refresh was exhausted; the session has been demoted.
    #[error("Session expired")]
    SessionExpired,

    /// The request failed for a reason unrelated to the token.
    #[error(transparent)]
    Backend(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(status: u16, code: Option<ErrorCode>) -> Error {
        Error::Backend {
            operation: "test",
            status: Some(status),
            code,
            detail: "raw backend text".into(),
        }
    }

    #[test]
    fn login_classification() {
        assert_eq!(
            AuthError::from_login(&rejection(401, Some(ErrorCode::InvalidCredentials))),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            AuthError::from_login(&rejection(401, None)),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            AuthError::from_login(&rejection(503, None)),
            AuthError::NetworkOrServerError
        );
        assert_eq!(
            AuthError::from_login(&Error::Timeout("login")),
            AuthError::NetworkOrServerError
        );
    }

    #[test]
    fn registration_classification() {
        assert_eq!(
            AuthError::from_registration(&rejection(400, Some(ErrorCode::RecordNotUnique))),
            AuthError::DuplicateIdentifier
        );
        assert_eq!(
            AuthError::from_registration(&rejection(409, None)),
            AuthError::DuplicateIdentifier
        );
        assert_eq!(
            AuthError::from_registration(&rejection(400, Some(ErrorCode::FailedValidation))),
            AuthError::ValidationError
        );
        assert_eq!(
            AuthError::from_registration(&rejection(500, None)),
            AuthError::NetworkOrServerError
        );
    }

    #[test]
    fn messages_do_not_leak_backend_text() {
        let kind = AuthError::from_login(&rejection(401, None));
        assert!(!kind.to_string().contains("raw backend text"));
    }
}
