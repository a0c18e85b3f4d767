//! Classified Compute Engine errors
//!
//! Every failure leaving the gateway is tagged once, here, so callers never
//! inspect HTTP status codes or transport error types themselves.

use thiserror::Error;

/// Error returned by a [`ComputeGateway`](crate::ComputeGateway) call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComputeError {
    /// The addressed resource does not exist (HTTP 404)
    #[error("googleapi: Error 404: {0}")]
    NotFound(String),

    /// The provider rejected the request; retrying the same request will not help
    #[error("googleapi: Error {code}: {message}")]
    Permanent {
        /// HTTP status code returned by the API
        code: u16,
        /// Provider error message
        message: String,
    },

    /// Transport failure, throttling or server-side error
    #[error("{0}")]
    Transient(String),
}

impl ComputeError {
    /// Classify a non-success HTTP response
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => Self::NotFound(message),
            408 | 429 => Self::Transient(format!("googleapi: Error {}: {}", code, message)),
            500..=599 => Self::Transient(format!("googleapi: Error {}: {}", code, message)),
            _ => Self::Permanent { code, message },
        }
    }

    /// Whether the resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Provider status code for API errors
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Permanent { code, .. } => Some(*code),
            Self::Transient(_) => None,
        }
    }
}

impl From<reqwest::Error> for ComputeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert!(ComputeError::from_status(404, "gone").is_not_found());
        assert_eq!(
            ComputeError::from_status(400, "bad"),
            ComputeError::Permanent {
                code: 400,
                message: "bad".into()
            }
        );
        assert!(matches!(
            ComputeError::from_status(503, "later"),
            ComputeError::Transient(_)
        ));
        assert!(matches!(
            ComputeError::from_status(429, "slow down"),
            ComputeError::Transient(_)
        ));
    }

    #[test]
    fn renders_like_the_google_client() {
        let err = ComputeError::from_status(400, "error");
        assert_eq!(err.to_string(), "googleapi: Error 400: error");
        assert_eq!(err.code(), Some(400));
        assert_eq!(ComputeError::Transient("fail".into()).to_string(), "fail");
        assert_eq!(ComputeError::Transient("fail".into()).code(), None);
    }
}
