//! Error types for the Gantry actuator and termination handler
//!
//! Errors carry the context an operator needs to act on them (machine name,
//! resource, operation) and keep the underlying message text intact so the
//! original provider diagnostics survive every wrapping layer.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Gantry operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Machine spec or label defect detected before any cloud call
    #[error("failed validating machine provider spec: {message}")]
    Validation {
        /// Name of the machine with invalid configuration
        machine: String,
        /// Description of what's invalid
        message: String,
    },

    /// Permanent configuration error, the caller must not retry blindly
    #[error("{message}")]
    InvalidConfiguration {
        /// Name of the machine the configuration belongs to
        machine: String,
        /// Description of the rejected configuration
        message: String,
        /// Provider status code when the rejection came from the cloud API
        code: Option<u16>,
    },

    /// Transient gateway failure, surfaced verbatim
    #[error("{message}")]
    Gateway {
        /// Description of what failed, including the provider text
        message: String,
    },

    /// Not a failure: the operation must be retried after the given delay
    #[error("requeue in {after:?}")]
    RequeueAfter {
        /// Delay before the caller should retry
        after: Duration,
    },

    /// A named resource could not be fetched
    #[error("failed to fetch {resource}: {message}")]
    Fetch {
        /// Human readable identity of the resource
        resource: String,
        /// Underlying failure
        message: String,
        /// Whether the resource does not exist (as opposed to a failed request)
        not_found: bool,
    },

    /// A bounded retry budget was exhausted
    #[error("{operation}: timed out after {budget:?}")]
    Timeout {
        /// The operation that was being retried
        operation: String,
        /// The budget that ran out
        budget: Duration,
    },

    /// Plain HTTP request failure
    #[error("request to {url} failed: {message}")]
    Http {
        /// Requested URL
        url: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The type being (de)serialized, if known
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "termination", "create_client")
        context: String,
    },
}

impl Error {
    /// Create a validation error without machine context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            machine: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a named machine
    pub fn validation_for(machine: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            machine: machine.into(),
            message: msg.into(),
        }
    }

    /// Create a permanent configuration error for a named machine
    pub fn invalid_configuration(machine: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            machine: machine.into(),
            message: msg.into(),
            code: None,
        }
    }

    /// Create a permanent configuration error classified from a provider status code
    pub fn invalid_configuration_with_code(
        machine: impl Into<String>,
        code: u16,
        msg: impl Into<String>,
    ) -> Self {
        Self::InvalidConfiguration {
            machine: machine.into(),
            message: msg.into(),
            code: Some(code),
        }
    }

    /// Create a transient gateway error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway {
            message: msg.into(),
        }
    }

    /// Ask the caller to retry after `after`
    pub fn requeue_after(after: Duration) -> Self {
        Self::RequeueAfter { after }
    }

    /// Create a fetch error for a resource that could not be read
    pub fn fetch(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            resource: resource.into(),
            message: msg.into(),
            not_found: false,
        }
    }

    /// Create a fetch error for a resource that does not exist
    pub fn fetch_not_found(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            resource: resource.into(),
            message: msg.into(),
            not_found: true,
        }
    }

    /// Create a timeout error for an exhausted retry budget
    pub fn timeout(operation: impl Into<String>, budget: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            budget,
        }
    }

    /// Create an HTTP request error
    pub fn http(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with type context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, configuration and serialization errors need a spec fix.
    /// A requeue is an explicit instruction to try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Validation { .. } => false,
            Error::InvalidConfiguration { .. } => false,
            Error::Gateway { .. } => true,
            Error::RequeueAfter { .. } => true,
            Error::Fetch { .. } => true,
            Error::Timeout { .. } => true,
            Error::Http { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// The requested delay when this is a requeue signal
    pub fn requeue_delay(&self) -> Option<Duration> {
        match self {
            Error::RequeueAfter { after } => Some(*after),
            _ => None,
        }
    }

    /// Whether this error reports a resource that does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Fetch { not_found, .. } => *not_found,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// Get the machine name if this error is associated with a specific machine
    pub fn machine(&self) -> Option<&str> {
        match self {
            Error::Validation { machine, .. } => Some(machine),
            Error::InvalidConfiguration { machine, .. } => Some(machine),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a spec defect is terminal and names the machine
    #[test]
    fn story_validation_is_terminal() {
        let err = Error::validation_for("worker-a", "all target pools must have valid name");
        assert_eq!(
            err.to_string(),
            "failed validating machine provider spec: all target pools must have valid name"
        );
        assert_eq!(err.machine(), Some("worker-a"));
        assert!(!err.is_retryable());

        let err = Error::validation("missing label");
        assert_eq!(err.machine(), Some(UNKNOWN_CONTEXT));
    }

    /// Story: a provider rejection is permanent and its message is kept verbatim
    #[test]
    fn story_configuration_error_keeps_provider_text() {
        let err = Error::invalid_configuration_with_code(
            "worker-a",
            400,
            "error launching instance: googleapi: Error 400: bad disk",
        );
        assert_eq!(
            err.to_string(),
            "error launching instance: googleapi: Error 400: bad disk"
        );
        assert!(!err.is_retryable());
        match err {
            Error::InvalidConfiguration { code, .. } => assert_eq!(code, Some(400)),
            _ => panic!("Expected InvalidConfiguration variant"),
        }
    }

    #[test]
    fn requeue_is_not_a_failure() {
        let err = Error::requeue_after(Duration::from_secs(20));
        assert!(err.is_retryable());
        assert_eq!(err.requeue_delay(), Some(Duration::from_secs(20)));
        assert_eq!(Error::gateway("boom").requeue_delay(), None);
    }

    #[test]
    fn fetch_error_names_the_resource() {
        let err = Error::fetch_not_found(
            "running instances in instance group infra-master-zone1",
            "instanceGroupsListInstances request failed: not found",
        );
        assert_eq!(
            err.to_string(),
            "failed to fetch running instances in instance group infra-master-zone1: \
             instanceGroupsListInstances request failed: not found"
        );
        assert!(err.is_not_found());
        assert!(!Error::fetch("x", "y").is_not_found());
    }

    #[test]
    fn timeout_reports_budget() {
        let err = Error::timeout("error marking node", Duration::from_secs(30));
        assert_eq!(err.to_string(), "error marking node: timed out after 30s");
        assert!(err.is_retryable());
    }

    #[test]
    fn internal_error_with_context() {
        let err = Error::internal_with_context("termination", "task panicked");
        assert!(err.to_string().contains("[termination]"));
        assert!(Error::internal("x").to_string().contains("[unknown]"));
        assert!(!Error::serialization_for_kind("GcpMachineProviderSpec", "bad").is_retryable());
    }
}
