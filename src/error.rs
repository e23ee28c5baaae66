use std::fmt;
use std::str::FromStr;

/// Transport and backend failures.
///
/// This is the raw error surface of the endpoint traits. Callers of
/// [`SessionManager`](crate::session::SessionManager) never see it directly;
/// it is classified into [`AuthError`](crate::session::AuthError) first.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{operation} failed (status {status:?}, code {code:?}): {detail}")]
    Backend {
        operation: &'static str,
        status: Option<u16>,
        code: Option<ErrorCode>,
        detail: String,
    },

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl Error {
    /// Shorthand for a backend rejection carrying a machine-readable code.
    #[must_use]
    pub fn backend(operation: &'static str, status: u16, code: ErrorCode) -> Self {
        Self::Backend {
            operation,
            status: Some(status),
            code: Some(code),
            detail: String::new(),
        }
    }

    /// HTTP status of a backend rejection, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => *status,
            #[cfg(feature = "http")]
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Backend error code, if the response carried one.
    #[must_use]
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Backend { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    /// True when the backend rejected the access token as expired or invalid.
    #[must_use]
    pub fn is_token_rejection(&self) -> bool {
        match self.code() {
            Some(ErrorCode::TokenExpired | ErrorCode::InvalidToken) => true,
            Some(_) => false,
            None => self.status() == Some(401),
        }
    }

    /// True when the backend answered and refused the credential itself.
    ///
    /// Outages (5xx), throttling and timeouts are not rejections: the
    /// credential may still be good.
    #[must_use]
    pub fn is_credential_rejection(&self) -> bool {
        if self.is_token_rejection() {
            return true;
        }
        matches!(self.status(), Some(s) if (400..500).contains(&s) && s != 408 && s != 429)
    }

    /// True when the request never produced a backend answer.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            Self::Http(e) => e.status().is_none(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Machine-readable error code from the backend's `extensions.code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    InvalidCredentials,
    TokenExpired,
    InvalidToken,
    RecordNotUnique,
    FailedValidation,
    InvalidPayload,
    Forbidden,
    Other(String),
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::RecordNotUnique => "RECORD_NOT_UNIQUE",
            Self::FailedValidation => "FAILED_VALIDATION",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::Forbidden => "FORBIDDEN",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INVALID_CREDENTIALS" => Self::InvalidCredentials,
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "INVALID_TOKEN" => Self::InvalidToken,
            "RECORD_NOT_UNIQUE" => Self::RecordNotUnique,
            "FAILED_VALIDATION" => Self::FailedValidation,
            "INVALID_PAYLOAD" => Self::InvalidPayload,
            "FORBIDDEN" => Self::Forbidden,
            other => Self::Other(other.to_owned()),
        })
    }
}
