//! Blocking surface for hosts that call from their own threads.
//!
//! Each method blocks the calling thread until the operation completes. Do
//! not call these from inside an async runtime.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::config::{LabelerConfig, LabelerSettings, ValidationReport};
use crate::engine::ClassificationEngine;
use crate::error::{LabelerError, LabelerResult, OperationError};
use crate::labeling::ApplyOutcome;
use crate::session::SessionStatus;

const RUNTIME_THREADS: usize = 2;

/// Blocking wrapper around [`crate::Labeler`].
pub struct Labeler {
    inner: crate::Labeler,
    runtime: Runtime,
}

impl Labeler {
    /// Create an unconfigured labeler.
    ///
    /// # Errors
    /// Returns `Runtime` if the internal runtime cannot start.
    pub fn new(
        engine: Arc<dyn ClassificationEngine>,
        settings: LabelerSettings,
    ) -> LabelerResult<Self> {
        Self::from_async(crate::Labeler::new(engine, settings))
    }

    /// Configure and return a ready-to-use labeler.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an incomplete configuration, or
    /// `Runtime` if the internal runtime cannot start.
    pub fn create(
        engine: Arc<dyn ClassificationEngine>,
        config: LabelerConfig,
        settings: LabelerSettings,
    ) -> LabelerResult<Self> {
        Self::from_async(crate::Labeler::create(engine, config, settings)?)
    }

    /// Wrap an existing async labeler.
    ///
    /// # Errors
    /// Returns `Runtime` if the internal runtime cannot start.
    pub fn from_async(inner: crate::Labeler) -> LabelerResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("labeler")
            .enable_all()
            .build()
            .map_err(LabelerError::Runtime)?;
        Ok(Self { inner, runtime })
    }

    /// The async handle sharing this labeler's state.
    #[must_use]
    pub fn as_async(&self) -> &crate::Labeler {
        &self.inner
    }

    /// # Errors
    /// Returns `InvalidArgument` if a required field is empty.
    pub fn configure(&self, config: LabelerConfig) -> LabelerResult<()> {
        self.inner.configure(config)
    }

    #[must_use]
    pub fn validate_configuration(&self) -> ValidationReport {
        self.inner.validate_configuration()
    }

    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        self.inner.session_status()
    }

    /// # Errors
    /// Returns `InvalidConfiguration` or `InitializationFailed`.
    pub fn warm_up(&self) -> LabelerResult<()> {
        self.runtime.block_on(self.inner.warm_up())
    }

    pub fn reset_for_testing(&self) {
        self.inner.reset_for_testing();
    }

    /// # Errors
    /// See [`crate::Labeler::apply_label`].
    pub fn apply_label(
        &self,
        path: impl AsRef<Path>,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        self.runtime
            .block_on(self.inner.apply_label(path, label_id, justification))
    }

    /// # Errors
    /// See [`crate::Labeler::apply_label_to_word_file`].
    pub fn apply_label_to_word_file(
        &self,
        path: impl AsRef<Path>,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        self.runtime
            .block_on(self.inner.apply_label_to_word_file(path, label_id, justification))
    }

    /// # Errors
    /// See [`crate::Labeler::apply_label_to_excel_file`].
    pub fn apply_label_to_excel_file(
        &self,
        path: impl AsRef<Path>,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        self.runtime
            .block_on(self.inner.apply_label_to_excel_file(path, label_id, justification))
    }

    /// # Errors
    /// See [`crate::Labeler::get_applied_label_id`].
    pub fn get_applied_label_id(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<String>, OperationError> {
        self.runtime.block_on(self.inner.get_applied_label_id(path))
    }
}
