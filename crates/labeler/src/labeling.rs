//! Label application and inspection.
//!
//! Every apply runs the same protocol: validate the path (and extension for
//! the Word/Excel entry points), make sure the engine session is ready,
//! resolve the label and justification, stage the labeled output next to the
//! original as `<path>.tmp`, commit it, then rename it over the original. The
//! staging file is removed on every failure path.

use std::ffi::OsString;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, LabelerConfig, LabelerSettings, ValidationReport};
use crate::engine::{ClassificationEngine, HandlerRequest, LabelingOptions, ProtectionSettings};
use crate::error::{LabelerError, LabelerResult, OperationError};
use crate::session::{SessionManager, SessionStatus};

const STAGING_SUFFIX: &str = ".tmp";

/// Public labeling operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    ApplyLabel,
    ApplyLabelToWordFile,
    ApplyLabelToExcelFile,
    GetAppliedLabelId,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplyLabel => write!(f, "ApplyLabel"),
            Self::ApplyLabelToWordFile => write!(f, "ApplyLabelToWordFile"),
            Self::ApplyLabelToExcelFile => write!(f, "ApplyLabelToExcelFile"),
            Self::GetAppliedLabelId => write!(f, "GetAppliedLabelId"),
        }
    }
}

/// Steps of a labeling operation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStep {
    ValidatePath,
    ValidateExtension,
    EnsureSession,
    PrepareStaging,
    OpenHandler,
    ResolveLabel,
    SetLabel,
    Commit,
    Replace,
    ReadLabel,
}

impl fmt::Display for LabelStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidatePath => write!(f, "validate_path"),
            Self::ValidateExtension => write!(f, "validate_extension"),
            Self::EnsureSession => write!(f, "ensure_session"),
            Self::PrepareStaging => write!(f, "prepare_staging"),
            Self::OpenHandler => write!(f, "open_handler"),
            Self::ResolveLabel => write!(f, "resolve_label"),
            Self::SetLabel => write!(f, "set_label"),
            Self::Commit => write!(f, "commit"),
            Self::Replace => write!(f, "replace"),
            Self::ReadLabel => write!(f, "read_label"),
        }
    }
}

/// Document type an apply entry point accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Any,
    Word,
    Excel,
}

impl FileKind {
    /// Required extension, without the dot.
    #[must_use]
    pub const fn expected_extension(self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Word => Some("docx"),
            Self::Excel => Some("xlsx"),
        }
    }

    #[must_use]
    pub const fn operation(self) -> Operation {
        match self {
            Self::Any => Operation::ApplyLabel,
            Self::Word => Operation::ApplyLabelToWordFile,
            Self::Excel => Operation::ApplyLabelToExcelFile,
        }
    }

    /// Justification used when the caller gives none.
    #[must_use]
    pub const fn default_justification(self) -> &'static str {
        match self {
            Self::Any => "Label applied by automated labeling service",
            Self::Word => "Label applied to Word document by automated labeling service",
            Self::Excel => "Label applied to Excel workbook by automated labeling service",
        }
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub path: PathBuf,
    pub label_id: String,
    pub label_name: String,
    pub justification: String,
    /// Label the file carried before, if any.
    pub previous_label_id: Option<String>,
}

/// Handle for labeling files.
///
/// Cheap to clone; clones share configuration and engine session.
#[derive(Clone)]
pub struct Labeler {
    config: Arc<ConfigStore>,
    sessions: Arc<SessionManager>,
}

impl Labeler {
    /// Create an unconfigured labeler.
    pub fn new(engine: Arc<dyn ClassificationEngine>, settings: LabelerSettings) -> Self {
        let config = Arc::new(ConfigStore::new());
        let sessions = Arc::new(SessionManager::new(engine, Arc::clone(&config), settings));
        Self { config, sessions }
    }

    /// Configure and return a ready-to-use labeler. The session is not
    /// bootstrapped until first use or [`Labeler::warm_up`].
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a required field is empty.
    pub fn create(
        engine: Arc<dyn ClassificationEngine>,
        config: LabelerConfig,
        settings: LabelerSettings,
    ) -> LabelerResult<Self> {
        let labeler = Self::new(engine, settings);
        labeler.configure(config)?;
        Ok(labeler)
    }

    /// Replace the configuration.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a required field is empty; the previous
    /// configuration is kept.
    pub fn configure(&self, config: LabelerConfig) -> LabelerResult<()> {
        self.config.configure(config)?;
        debug!("Labeler configured");
        Ok(())
    }

    /// Check the configuration without touching the engine.
    #[must_use]
    pub fn validate_configuration(&self) -> ValidationReport {
        self.config.validate()
    }

    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        self.sessions.status()
    }

    /// Bootstrap the engine session without labeling anything.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` or `InitializationFailed`.
    pub async fn warm_up(&self) -> LabelerResult<()> {
        self.sessions.ensure_ready().await.map(|_| ())
    }

    /// Discard the engine session; configuration is kept.
    pub fn reset_for_testing(&self) {
        self.sessions.reset();
    }

    /// Apply a label to any supported file.
    ///
    /// `label_id` and `justification` fall back to the configured default
    /// label and a generic justification when `None` or empty.
    ///
    /// # Errors
    /// Returns an [`OperationError`] naming the step that failed.
    pub async fn apply_label(
        &self,
        path: impl AsRef<Path>,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        self.apply(FileKind::Any, path.as_ref(), label_id, justification)
            .await
    }

    /// Apply a label to a `.docx` file.
    ///
    /// # Errors
    /// As [`Labeler::apply_label`], plus `InvalidArgument` for other extensions.
    pub async fn apply_label_to_word_file(
        &self,
        path: impl AsRef<Path>,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        self.apply(FileKind::Word, path.as_ref(), label_id, justification)
            .await
    }

    /// Apply a label to a `.xlsx` file.
    ///
    /// # Errors
    /// As [`Labeler::apply_label`], plus `InvalidArgument` for other extensions.
    pub async fn apply_label_to_excel_file(
        &self,
        path: impl AsRef<Path>,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        self.apply(FileKind::Excel, path.as_ref(), label_id, justification)
            .await
    }

    /// Id of the label attached to a file, or `None` if it is unlabeled.
    /// Never modifies the file.
    ///
    /// # Errors
    /// Returns an [`OperationError`] naming the step that failed.
    pub async fn get_applied_label_id(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<String>, OperationError> {
        let path = path.as_ref();
        let attempt = Attempt::new(Operation::GetAppliedLabelId, path);

        check_path_shape(path).map_err(|e| attempt.fail(LabelStep::ValidatePath, e))?;
        check_path_exists(path)
            .await
            .map_err(|e| attempt.fail(LabelStep::ValidatePath, e))?;

        let session = self
            .sessions
            .ensure_ready()
            .await
            .map_err(|e| attempt.fail(LabelStep::EnsureSession, e))?;

        let handler = session
            .file_engine()
            .open_handler(HandlerRequest {
                source: path.to_path_buf(),
                destination: path.to_path_buf(),
                modify: false,
            })
            .await
            .map_err(|e| attempt.fail(LabelStep::OpenHandler, e.into()))?;

        let label_id = handler.current_label().map(|current| current.label.id);
        debug!(path = %path.display(), label_id = ?label_id, "Read applied label");
        Ok(label_id)
    }

    async fn apply(
        &self,
        kind: FileKind,
        path: &Path,
        label_id: Option<&str>,
        justification: Option<&str>,
    ) -> Result<ApplyOutcome, OperationError> {
        let attempt = Attempt::new(kind.operation(), path);

        check_path_shape(path).map_err(|e| attempt.fail(LabelStep::ValidatePath, e))?;
        if let Some(expected) = kind.expected_extension() {
            check_extension(path, expected)
                .map_err(|e| attempt.fail(LabelStep::ValidateExtension, e))?;
        }
        check_path_exists(path)
            .await
            .map_err(|e| attempt.fail(LabelStep::ValidatePath, e))?;

        let session = self
            .sessions
            .ensure_ready()
            .await
            .map_err(|e| attempt.fail(LabelStep::EnsureSession, e))?;
        let config = self.config.snapshot().ok_or_else(|| {
            attempt.fail(
                LabelStep::EnsureSession,
                LabelerError::InvalidConfiguration(ValidationReport::unconfigured()),
            )
        })?;

        let label_id = non_empty(label_id).unwrap_or_else(|| config.default_label_id.trim());
        let justification = non_empty(justification).unwrap_or(kind.default_justification());

        let staged = staging_path(path);
        match tokio::fs::try_exists(&staged).await {
            Ok(false) => {}
            Ok(true) => {
                return Err(attempt.fail(
                    LabelStep::PrepareStaging,
                    LabelerError::InvalidArgument(format!(
                        "staging path '{}' already exists",
                        staged.display()
                    )),
                ));
            }
            Err(source) => {
                return Err(attempt.fail(
                    LabelStep::PrepareStaging,
                    LabelerError::Io {
                        path: staged,
                        source,
                    },
                ));
            }
        }
        // Nothing was at the staging path, so whatever appears there is ours.
        let mut staging = StagingFile::new(staged);
        let engine = session.file_engine();

        let mut handler = engine
            .open_handler(HandlerRequest {
                source: path.to_path_buf(),
                destination: staging.path().to_path_buf(),
                modify: true,
            })
            .await
            .map_err(|e| attempt.fail(LabelStep::OpenHandler, e.into()))?;
        let previous_label_id = handler.current_label().map(|current| current.label.id);

        let label = engine
            .label_by_id(label_id)
            .await
            .map_err(|e| attempt.fail(LabelStep::ResolveLabel, e.into()))?
            .ok_or_else(|| {
                attempt.fail(
                    LabelStep::ResolveLabel,
                    LabelerError::LabelNotFound {
                        label_id: label_id.to_string(),
                    },
                )
            })?;

        let options = LabelingOptions::standard(justification);
        handler
            .set_label(&label, &options, &ProtectionSettings::default())
            .map_err(|e| attempt.fail(LabelStep::SetLabel, e.into()))?;

        let committed = handler
            .commit(staging.path())
            .await
            .map_err(|e| attempt.fail(LabelStep::Commit, e.into()))?;
        drop(handler);

        if !committed {
            return Err(attempt.fail(
                LabelStep::Commit,
                LabelerError::CommitFailed {
                    path: path.to_path_buf(),
                    reason: "engine reported the commit as unsuccessful".to_string(),
                },
            ));
        }
        if !tokio::fs::try_exists(staging.path()).await.unwrap_or(false) {
            return Err(attempt.fail(
                LabelStep::Commit,
                LabelerError::CommitFailed {
                    path: path.to_path_buf(),
                    reason: format!(
                        "commit produced no staging file at '{}'",
                        staging.path().display()
                    ),
                },
            ));
        }

        let replaced = match sync_file(staging.path()).await {
            Ok(()) => tokio::fs::rename(staging.path(), path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = replaced {
            let staging_removed = staging.remove().await;
            return Err(attempt.fail(
                LabelStep::Replace,
                LabelerError::ReplaceFailed {
                    path: path.to_path_buf(),
                    staging_removed,
                    source,
                },
            ));
        }
        staging.disarm();
        sync_parent_dir(path).await;

        info!(
            operation = %kind.operation(),
            path = %path.display(),
            label_id = %label.id,
            previous_label_id = ?previous_label_id,
            "Label applied"
        );

        Ok(ApplyOutcome {
            path: path.to_path_buf(),
            label_id: label.id,
            label_name: label.name,
            justification: justification.to_string(),
            previous_label_id,
        })
    }
}

/// Operation context attached to failures.
struct Attempt<'a> {
    operation: Operation,
    path: &'a Path,
}

impl<'a> Attempt<'a> {
    fn new(operation: Operation, path: &'a Path) -> Self {
        Self { operation, path }
    }

    fn fail(&self, step: LabelStep, source: LabelerError) -> OperationError {
        debug!(
            operation = %self.operation,
            path = %self.path.display(),
            step = %step,
            error = %source,
            "Labeling operation failed"
        );
        OperationError {
            operation: self.operation,
            path: self.path.to_path_buf(),
            step,
            source,
        }
    }
}

/// Staging file removed on drop unless disarmed.
struct StagingFile {
    path: PathBuf,
    armed: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal; returns whether the file is gone.
    async fn remove(&mut self) -> bool {
        self.armed = false;
        removal_outcome(&self.path, tokio::fs::remove_file(&self.path).await)
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            removal_outcome(&self.path, std::fs::remove_file(&self.path));
        }
    }
}

fn removal_outcome(path: &Path, result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove staging file");
            false
        }
    }
}

async fn sync_file(path: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(path).await?.sync_all().await
}

/// Flush the rename to disk. The file is already in place, so failures only warn.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) {
    let Some(dir) = path.parent() else {
        return;
    };
    if let Err(e) = sync_file(dir).await {
        warn!(dir = %dir.display(), error = %e, "Failed to sync directory after replace");
    }
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) {}

/// `<path>.tmp`, next to the original.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut staged = OsString::from(path.as_os_str());
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn check_path_shape(path: &Path) -> LabelerResult<()> {
    if path.as_os_str().is_empty() {
        return Err(LabelerError::InvalidArgument(
            "file path must not be empty".to_string(),
        ));
    }
    if !path.is_absolute() {
        return Err(LabelerError::InvalidArgument(format!(
            "file path '{}' must be absolute",
            path.display()
        )));
    }
    Ok(())
}

fn check_extension(path: &Path, expected: &str) -> LabelerResult<()> {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(expected));
    if matches {
        Ok(())
    } else {
        Err(LabelerError::InvalidArgument(format!(
            "file '{}' has the wrong extension, expected .{expected}",
            path.display()
        )))
    }
}

async fn check_path_exists(path: &Path) -> LabelerResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(LabelerError::InvalidArgument(format!(
            "'{}' is not a file",
            path.display()
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(LabelerError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(LabelerError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
