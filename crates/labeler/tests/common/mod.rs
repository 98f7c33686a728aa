//! In-memory classification engine for integration tests.
//!
//! Labels are written as a `LABEL:<id>` header line at the top of the
//! committed file, so a later handler can read them back.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use labeler::engine::{
    AssignmentMethod, AuthDelegate, ClassificationEngine, ContentLabel, EngineSettings, FileEngine,
    FileHandler, FileProfile, HandlerRequest, Label, LabelingOptions, ProfileSettings,
    ProtectionSettings, TokenRequest,
};
use labeler::{EngineError, LabelerConfig, LabelerSettings, NativeSearch, ProxyMode};
use tempfile::TempDir;

pub const TENANT_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const CLIENT_ID: &str = "22222222-2222-2222-2222-222222222222";
pub const CLIENT_SECRET: &str = "s3cr3t";
pub const DEFAULT_LABEL_ID: &str = "33333333-3333-3333-3333-333333333333";
pub const CONFIDENTIAL_LABEL_ID: &str = "44444444-4444-4444-4444-444444444444";
pub const UNKNOWN_LABEL_ID: &str = "99999999-9999-9999-9999-999999999999";

const LABEL_HEADER: &str = "LABEL:";

/// What `commit` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Write the labeled copy and report success.
    Normal,
    /// Report failure without writing.
    ReportFailure,
    /// Report success without writing anything.
    SkipWrite,
    /// Write the copy, then replace the original with a non-empty directory.
    ClobberOriginal,
    /// Report success after putting a non-empty directory at the destination.
    DirectoryAtDestination,
}

/// Cloneable handle; clones share counters.
#[derive(Clone)]
pub struct FakeEngine(Arc<EngineState>);

pub struct EngineState {
    labels: HashMap<String, Label>,
    pub context_inits: AtomicUsize,
    pub profile_loads: AtomicUsize,
    pub engines_added: AtomicUsize,
    pub handlers_opened: AtomicUsize,
    pub fail_profile: AtomicBool,
    /// Resource to request a token for while adding the engine.
    pub token_resource: Mutex<Option<String>>,
    pub last_token: Mutex<Option<String>>,
    pub last_engine_settings: Mutex<Option<EngineSettings>>,
    pub profile_delay: Duration,
    pub commit_mode: Mutex<CommitMode>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_profile_delay(Duration::from_millis(0))
    }

    /// Engine whose profile load takes `delay`, to widen bootstrap races.
    pub fn with_profile_delay(profile_delay: Duration) -> Self {
        let labels = [
            Label::new(DEFAULT_LABEL_ID, "General"),
            Label::new(CONFIDENTIAL_LABEL_ID, "Confidential"),
        ]
        .into_iter()
        .map(|label| (label.id.clone(), label))
        .collect();

        Self(Arc::new(EngineState {
            labels,
            context_inits: AtomicUsize::new(0),
            profile_loads: AtomicUsize::new(0),
            engines_added: AtomicUsize::new(0),
            handlers_opened: AtomicUsize::new(0),
            fail_profile: AtomicBool::new(false),
            token_resource: Mutex::new(None),
            last_token: Mutex::new(None),
            last_engine_settings: Mutex::new(None),
            profile_delay,
            commit_mode: Mutex::new(CommitMode::Normal),
        }))
    }

    pub fn shared(&self) -> Arc<dyn ClassificationEngine> {
        Arc::new(self.clone())
    }

    pub fn set_commit_mode(&self, mode: CommitMode) {
        *self.commit_mode.lock().unwrap() = mode;
    }

    pub fn bootstraps(&self) -> usize {
        self.engines_added.load(Ordering::SeqCst)
    }
}

impl std::ops::Deref for FakeEngine {
    type Target = EngineState;

    fn deref(&self) -> &EngineState {
        &self.0
    }
}

#[async_trait]
impl ClassificationEngine for FakeEngine {
    fn initialize_context(&self) -> Result<(), EngineError> {
        self.context_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_profile(
        &self,
        settings: ProfileSettings,
    ) -> Result<Arc<dyn FileProfile>, EngineError> {
        if !self.profile_delay.is_zero() {
            tokio::time::sleep(self.profile_delay).await;
        }
        self.profile_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(EngineError::msg("profile store is unavailable"));
        }
        Ok(Arc::new(FakeProfile {
            engine: self.clone(),
            auth: settings.auth,
        }))
    }
}

struct FakeProfile {
    engine: FakeEngine,
    auth: Arc<dyn AuthDelegate>,
}

#[async_trait]
impl FileProfile for FakeProfile {
    async fn add_engine(
        &self,
        settings: EngineSettings,
    ) -> Result<Arc<dyn FileEngine>, EngineError> {
        let resource = self.engine.token_resource.lock().unwrap().clone();
        if let Some(resource) = resource {
            let token = self
                .auth
                .acquire_token(&TokenRequest::new(resource, ""))
                .await
                .map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
            *self.engine.last_token.lock().unwrap() = Some(token);
        }

        self.engine.engines_added.fetch_add(1, Ordering::SeqCst);
        *self.engine.last_engine_settings.lock().unwrap() = Some(settings);
        Ok(Arc::new(FakeFileEngine {
            engine: self.engine.clone(),
        }))
    }
}

struct FakeFileEngine {
    engine: FakeEngine,
}

#[async_trait]
impl FileEngine for FakeFileEngine {
    async fn label_by_id(&self, label_id: &str) -> Result<Option<Label>, EngineError> {
        Ok(self.engine.labels.get(label_id).cloned())
    }

    async fn open_handler(
        &self,
        request: HandlerRequest,
    ) -> Result<Box<dyn FileHandler>, EngineError> {
        self.engine.handlers_opened.fetch_add(1, Ordering::SeqCst);
        let bytes = tokio::fs::read(&request.source)
            .await
            .map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
        let (label_id, body) = split_header(&bytes);
        let current = label_id.map(|id| ContentLabel {
            label: self
                .engine
                .labels
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Label::new(id.clone(), id)),
            assignment_method: AssignmentMethod::Standard,
            creation_time: None,
        });

        Ok(Box::new(FakeHandler {
            source: request.source,
            body: body.to_vec(),
            current,
            pending: None,
            mode: *self.engine.commit_mode.lock().unwrap(),
        }))
    }
}

struct FakeHandler {
    source: PathBuf,
    body: Vec<u8>,
    current: Option<ContentLabel>,
    pending: Option<(Label, LabelingOptions)>,
    mode: CommitMode,
}

#[async_trait]
impl FileHandler for FakeHandler {
    fn current_label(&self) -> Option<ContentLabel> {
        self.current.clone()
    }

    fn set_label(
        &mut self,
        label: &Label,
        options: &LabelingOptions,
        _protection: &ProtectionSettings,
    ) -> Result<(), EngineError> {
        if options.justification.is_empty() {
            return Err(EngineError::msg("justification required"));
        }
        self.pending = Some((label.clone(), options.clone()));
        Ok(())
    }

    async fn commit(&mut self, destination: &Path) -> Result<bool, EngineError> {
        let Some((label, _)) = &self.pending else {
            return Ok(false);
        };
        match self.mode {
            CommitMode::ReportFailure => return Ok(false),
            CommitMode::SkipWrite => return Ok(true),
            CommitMode::DirectoryAtDestination => {
                std::fs::create_dir(destination)
                    .map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
                std::fs::write(destination.join("occupant"), b"x")
                    .map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
                return Ok(true);
            }
            CommitMode::Normal | CommitMode::ClobberOriginal => {}
        }

        let mut out = format!("{LABEL_HEADER}{}\n", label.id).into_bytes();
        out.extend_from_slice(&self.body);
        tokio::fs::write(destination, out)
            .await
            .map_err(|e| EngineError::from(anyhow::Error::new(e)))?;

        if self.mode == CommitMode::ClobberOriginal {
            std::fs::remove_file(&self.source).map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
            std::fs::create_dir(&self.source).map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
            std::fs::write(self.source.join("occupant"), b"x")
                .map_err(|e| EngineError::from(anyhow::Error::new(e)))?;
        }
        Ok(true)
    }
}

fn split_header(bytes: &[u8]) -> (Option<String>, &[u8]) {
    if bytes.starts_with(LABEL_HEADER.as_bytes()) {
        if let Some(end) = bytes.iter().position(|b| *b == b'\n') {
            let id = String::from_utf8_lossy(&bytes[LABEL_HEADER.len()..end]).to_string();
            return (Some(id), &bytes[end + 1..]);
        }
    }
    (None, bytes)
}

pub fn config() -> LabelerConfig {
    LabelerConfig::new(TENANT_ID, CLIENT_ID, CLIENT_SECRET, DEFAULT_LABEL_ID)
}

/// Settings that keep bootstrap off the network and out of the real environment.
pub fn settings(cache_root: &Path) -> LabelerSettings {
    LabelerSettings {
        cache_root: cache_root.to_path_buf(),
        proxy: ProxyMode::Disabled,
        native: NativeSearch {
            override_var: "LABELER_TEST_UNSET_NATIVE_DIR".to_string(),
            candidates: vec![],
            search_path_var: "LABELER_TEST_UNSET_LIBRARY_PATH".to_string(),
        },
        ..LabelerSettings::default()
    }
}

/// Scratch directory with a single document in it.
pub fn document(name: &str, contents: &[u8]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}
