//! Error types for the YTsaurus operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Reading an owned object from the orchestration layer failed
    #[error("failed to fetch {resource}: {message}")]
    Fetch {
        /// Object that could not be read (e.g. "StatefulSet/end-ytsaurus")
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Writing an owned object to the orchestration layer failed
    #[error("failed to apply {resource}: {message}")]
    Apply {
        /// Object that could not be written
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Config generation failed
    #[error("config generation error: {0}")]
    Config(String),

    /// A side-effect-free status pass returned an error.
    ///
    /// Dry passes never touch the orchestration layer, so reaching this is a
    /// defect. The current reconcile invocation must abort.
    #[error("invariant violation in {component}: {message}")]
    InvariantViolation {
        /// Component whose dry pass failed
        component: String,
        /// The underlying error rendered as text
        message: String,
    },
}

impl Error {
    /// Create a fetch error for the given object
    pub fn fetch(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an apply error for the given object
    pub fn apply(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a config generation error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an error returned by a dry pass
    pub fn invariant_violation(component: impl Into<String>, source: &Error) -> Self {
        Self::InvariantViolation {
            component: component.into(),
            message: source.to_string(),
        }
    }

    /// Returns true if this error must abort the current reconcile invocation
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// Returns true if retrying on the next tick may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Kube(_) | Self::Fetch { .. } | Self::Apply { .. })
    }
}
