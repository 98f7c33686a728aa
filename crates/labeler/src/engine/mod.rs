//! Classification engine boundary.
//!
//! The engine that inspects and rewrites document internals is an external
//! collaborator. This module defines the interface the labeler consumes:
//!
//! - [`ClassificationEngine`] initializes the process-wide context and loads profiles
//! - [`FileProfile`] adds identity-bound engines
//! - [`FileEngine`] looks up labels and opens file handlers
//! - [`FileHandler`] reads, sets and commits a label for one file
//!
//! The engine calls back into the labeler through [`AuthDelegate`] and
//! [`ConsentDelegate`].

mod models;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{EngineError, LabelerError};

pub use models::*;

/// Trait for classification engines.
#[async_trait]
pub trait ClassificationEngine: Send + Sync {
    /// Initialize the engine's global context for file operations.
    ///
    /// Called at most once per [`SessionManager`](crate::SessionManager),
    /// before its first profile load, and not again after a reset. Each
    /// labeler owns its own manager, so a process holding several labelers
    /// over one engine calls this once per labeler; implementations backed by
    /// process-global state must treat repeat calls as a no-op.
    fn initialize_context(&self) -> Result<(), EngineError>;

    /// Load a file-operation profile.
    async fn load_profile(
        &self,
        settings: ProfileSettings,
    ) -> Result<Arc<dyn FileProfile>, EngineError>;
}

/// A loaded file-operation profile.
#[async_trait]
pub trait FileProfile: Send + Sync {
    /// Add a named engine bound to an identity.
    async fn add_engine(&self, settings: EngineSettings)
        -> Result<Arc<dyn FileEngine>, EngineError>;
}

/// An identity-scoped engine. Calls must be safe to make concurrently.
#[async_trait]
pub trait FileEngine: Send + Sync {
    /// Look up a label by id.
    async fn label_by_id(&self, label_id: &str) -> Result<Option<Label>, EngineError>;

    /// Open a handler for a single file.
    async fn open_handler(
        &self,
        request: HandlerRequest,
    ) -> Result<Box<dyn FileHandler>, EngineError>;
}

/// Per-file label operations.
#[async_trait]
pub trait FileHandler: Send {
    /// Label currently attached to the source file.
    fn current_label(&self) -> Option<ContentLabel>;

    /// Stage a label change.
    fn set_label(
        &mut self,
        label: &Label,
        options: &LabelingOptions,
        protection: &ProtectionSettings,
    ) -> Result<(), EngineError>;

    /// Write the staged result to `destination`.
    async fn commit(&mut self, destination: &Path) -> Result<bool, EngineError>;
}

/// Token callback handed to the engine.
#[async_trait]
pub trait AuthDelegate: Send + Sync {
    /// Return a bearer token for `request.resource`.
    async fn acquire_token(&self, request: &TokenRequest) -> Result<String, LabelerError>;
}

/// Consent callback handed to the engine.
pub trait ConsentDelegate: Send + Sync {
    fn consent(&self, url: &str) -> Consent;
}

/// Consent delegate for headless use; always grants consent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConsent;

impl ConsentDelegate for AutoConsent {
    fn consent(&self, url: &str) -> Consent {
        debug!(url = %url, "Granting consent");
        Consent::AcceptAlways
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_consent_accepts() {
        assert_eq!(
            AutoConsent.consent("https://example.com"),
            Consent::AcceptAlways
        );
    }

    #[test]
    fn test_standard_options() {
        let options = LabelingOptions::standard("because");
        assert_eq!(options.assignment_method, AssignmentMethod::Standard);
        assert_eq!(options.justification, "because");
        assert!(options.downgrade_justified);
    }
}
