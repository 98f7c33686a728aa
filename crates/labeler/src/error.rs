//! Error types for labeling operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{ConfigSummary, ValidationReport};
use crate::labeling::{LabelStep, Operation};
use crate::session::BootstrapStep;

/// Boxed cause carried by bootstrap failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for crate-level operations.
pub type LabelerResult<T> = Result<T, LabelerError>;

/// Errors that can occur while configuring, bootstrapping or labeling.
#[derive(Error, Debug)]
pub enum LabelerError {
    /// Malformed, empty or non-absolute input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Target file does not exist.
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Configuration failed validation when the session was bootstrapped.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(ValidationReport),

    /// A bootstrap step failed.
    #[error("Engine initialization failed at {step} ({config}): {source}")]
    InitializationFailed {
        step: BootstrapStep,
        config: ConfigSummary,
        #[source]
        source: BoxError,
    },

    /// Token exchange with the directory service failed.
    #[error(
        "Authentication failed for resource '{resource}' (tenant {tenant_id}, client {client_id}): {source}"
    )]
    AuthenticationFailed {
        resource: String,
        tenant_id: String,
        client_id: String,
        #[source]
        source: AuthError,
    },

    /// The engine does not recognize the label id.
    #[error("Label '{label_id}' not found")]
    LabelNotFound { label_id: String },

    /// Commit reported failure or produced no staging file.
    #[error("Commit failed for '{}': {reason}", path.display())]
    CommitFailed { path: PathBuf, reason: String },

    /// Moving the staged output over the original failed.
    #[error("Failed to replace '{}' with staged output: {source}", path.display())]
    ReplaceFailed {
        path: PathBuf,
        /// Whether the staging file was cleaned up afterwards.
        staging_removed: bool,
        #[source]
        source: std::io::Error,
    },

    /// Error raised by the classification engine.
    #[error("Classification engine error: {0}")]
    Engine(#[from] EngineError),

    /// Filesystem error outside the replace step.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking runtime could not be created.
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Opaque error produced by a classification engine implementation.
///
/// The labeler never inspects these; they are carried through as causes.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct EngineError(#[from] anyhow::Error);

impl EngineError {
    /// Create an engine error from a message.
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

/// Errors raised by the credential provider and its transport.
#[derive(Error, Debug)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token endpoint returned an OAuth error body.
    #[error("Token endpoint returned {status}: {error}: {description}")]
    Rejected {
        status: u16,
        error: String,
        description: String,
    },

    /// Token endpoint returned something that is not a token.
    #[error("Unexpected token response: {0}")]
    InvalidResponse(String),

    /// Authority URL could not be used as a token endpoint base.
    #[error("Invalid authority '{authority}': {reason}")]
    InvalidAuthority { authority: String, reason: String },

    /// Proxy URL was rejected.
    #[error("Invalid proxy '{url}': {reason}")]
    Proxy { url: String, reason: String },
}

/// A failed labeling operation, with the step it reached.
#[derive(Error, Debug)]
#[error("{operation} failed at {step} for '{}': {source}", path.display())]
pub struct OperationError {
    /// Public operation that failed.
    pub operation: Operation,
    /// File the operation targeted.
    pub path: PathBuf,
    /// Last step attempted.
    pub step: LabelStep,
    /// Underlying failure.
    #[source]
    pub source: LabelerError,
}

impl OperationError {
    /// The categorized failure.
    #[must_use]
    pub fn error(&self) -> &LabelerError {
        &self.source
    }

    /// Discard the operation context.
    #[must_use]
    pub fn into_inner(self) -> LabelerError {
        self.source
    }
}
