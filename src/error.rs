//! Error types for the pull secret controller
//!
//! The controller reports three kinds of outcome to its caller: success,
//! a transient failure the dispatcher should retry later, and a fatal
//! configuration failure that no amount of retrying will fix. [`Error`]
//! carries the detail; [`Error::failure_class`] collapses it to the last two.

use std::time::Duration;

use thiserror::Error;

/// Main error type for pull secret controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (list/get/create/delete failed)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Create was rejected because the object is already present
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Kind of the managed resource
        kind: String,
        /// Namespace the create was issued in
        namespace: String,
        /// Name of the managed resource
        name: String,
    },

    /// Delete was rejected because the object is already gone
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the managed resource
        kind: String,
        /// Namespace the delete was issued in
        namespace: String,
        /// Name of the managed resource
        name: String,
    },

    /// Malformed or missing startup configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The invocation deadline elapsed before the pass finished
    #[error("reconciliation of namespace {namespace} timed out after {after:?}")]
    Timeout {
        /// Namespace being reconciled
        namespace: String,
        /// Deadline that elapsed
        after: Duration,
    },
}

/// How the dispatcher should treat a failed reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry later; the store may recover
    Transient,
    /// Do not retry; the process configuration must be fixed
    Fatal,
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an already-exists race for a managed resource
    pub fn already_exists(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a not-found race for a managed resource
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Classify this error for the dispatcher
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Error::Configuration(_) | Error::Serialization(_) => FailureClass::Fatal,
            Error::Kube(_)
            | Error::AlreadyExists { .. }
            | Error::NotFound { .. }
            | Error::Timeout { .. } => FailureClass::Transient,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }

    /// Check if this error is a create/delete race with another writer
    ///
    /// A race means the store already holds the state the failed write was
    /// trying to reach.
    pub fn is_race(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. } | Error::NotFound { .. })
    }
}
