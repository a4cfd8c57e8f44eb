//! pullsecret - keeps a managed resource alive wherever pods pull with a given secret
//!
//! For every namespace, the managed resource (by default an External Secrets
//! Operator `ExternalSecret`) exists if and only if some pod in that namespace
//! lists the configured trigger secret under `imagePullSecrets`. The
//! controller is level-triggered: each pass recomputes the namespace from a
//! full listing, so missed or duplicated watch events are harmless.
//!
//! # Modules
//!
//! - [`controller`] - Classifier, aggregator, evaluator and actuator
//! - [`runner`] - kube-rs `Controller` wiring and watch streams
//! - [`config`] - Immutable configuration record
//! - [`template`] - The managed resource template
//! - [`events`] - Kubernetes Event publishing
//! - [`telemetry`] - Structured logging setup
//! - [`kube_utils`] - Client construction and API helpers
//! - [`error`] - Error types and failure classification

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod runner;
pub mod telemetry;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
