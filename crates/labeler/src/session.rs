//! Engine session lifecycle.
//!
//! The session moves `Uninitialized -> Initializing -> Ready` once, on the
//! first caller that needs it, and back to `Uninitialized` only through
//! [`SessionManager::reset`]. Readers that find a ready session never take
//! the bootstrap lock.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::{CredentialProvider, TransportFactory};
use crate::config::{mask_identifier, ConfigStore, LabelerSettings, ValidationReport};
use crate::engine::{
    ApplicationInfo, AutoConsent, ClassificationEngine, EngineContextSettings, EngineLogLevel,
    EngineSettings, FileEngine, FileProfile, ProfileSettings,
};
use crate::error::{BoxError, LabelerError, LabelerResult};

const ENGINE_LOCALE: &str = "en-US";

/// Bootstrap steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    ConfigureTransport,
    ResolveNativeDependencies,
    InitializeContext,
    ValidateConfiguration,
    CreateDelegates,
    CreateContext,
    LoadProfile,
    AddEngine,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigureTransport => write!(f, "configure_transport"),
            Self::ResolveNativeDependencies => write!(f, "resolve_native_dependencies"),
            Self::InitializeContext => write!(f, "initialize_context"),
            Self::ValidateConfiguration => write!(f, "validate_configuration"),
            Self::CreateDelegates => write!(f, "create_delegates"),
            Self::CreateContext => write!(f, "create_context"),
            Self::LoadProfile => write!(f, "load_profile"),
            Self::AddEngine => write!(f, "add_engine"),
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// A ready, identity-bound engine session.
pub struct EngineSession {
    file_engine: Arc<dyn FileEngine>,
    /// Kept alive for as long as the engine.
    _profile: Arc<dyn FileProfile>,
    identity: String,
    engine_name: String,
    native_dir: Option<PathBuf>,
    created_at: DateTime<Utc>,
}

impl EngineSession {
    #[must_use]
    pub fn file_engine(&self) -> &Arc<dyn FileEngine> {
        &self.file_engine
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Native dependency directory found during bootstrap.
    #[must_use]
    pub fn native_dir(&self) -> Option<&PathBuf> {
        self.native_dir.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSession")
            .field("identity", &self.identity)
            .field("engine_name", &self.engine_name)
            .field("native_dir", &self.native_dir)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Owns the one-time bootstrap of the engine session.
pub struct SessionManager {
    engine: Arc<dyn ClassificationEngine>,
    config: Arc<ConfigStore>,
    settings: LabelerSettings,
    session: RwLock<Option<Arc<EngineSession>>>,
    /// Held for the whole bootstrap sequence.
    init_lock: Mutex<()>,
    /// Engine global context is initialized once per manager and survives `reset`.
    context_initialized: AtomicBool,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn ClassificationEngine>,
        config: Arc<ConfigStore>,
        settings: LabelerSettings,
    ) -> Self {
        Self {
            engine,
            config,
            settings,
            session: RwLock::new(None),
            init_lock: Mutex::new(()),
            context_initialized: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &LabelerSettings {
        &self.settings
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.current().is_some() {
            SessionStatus::Ready
        } else if self.init_lock.try_lock().is_err() {
            SessionStatus::Initializing
        } else {
            SessionStatus::Uninitialized
        }
    }

    /// The ready session, if bootstrap has completed.
    #[must_use]
    pub fn current(&self) -> Option<Arc<EngineSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the ready session, bootstrapping it first if needed.
    ///
    /// Concurrent callers during bootstrap wait for it and share the result.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` or `InitializationFailed`; the session
    /// stays uninitialized and the next call retries from scratch.
    pub async fn ensure_ready(&self) -> LabelerResult<Arc<EngineSession>> {
        if let Some(session) = self.current() {
            return Ok(session);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(session) = self.current() {
            return Ok(session);
        }

        let session = Arc::new(self.bootstrap().await?);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drop the session so the next call bootstraps again.
    ///
    /// Must not race with in-flight operations.
    pub fn reset(&self) {
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("Engine session reset");
        }
    }

    async fn bootstrap(&self) -> LabelerResult<EngineSession> {
        let config = self
            .config
            .snapshot()
            .ok_or_else(|| LabelerError::InvalidConfiguration(ValidationReport::unconfigured()))?;
        let summary = config.summary();
        let failed = |step: BootstrapStep, source: BoxError| LabelerError::InitializationFailed {
            step,
            config: summary.clone(),
            source,
        };

        info!(
            tenant = %mask_identifier(&config.tenant_id),
            client = %mask_identifier(&config.client_id),
            "Bootstrapping classification engine session"
        );

        debug!(step = %BootstrapStep::ConfigureTransport, min_tls = %self.settings.min_tls);
        let transport = TransportFactory::new(
            self.settings.proxy.clone(),
            self.settings.min_tls,
            self.settings.http_timeout,
        )
        .build()
        .map_err(|e| failed(BootstrapStep::ConfigureTransport, e.into()))?;

        debug!(step = %BootstrapStep::ResolveNativeDependencies);
        let native_dir = self
            .settings
            .native
            .apply()
            .map_err(|e| failed(BootstrapStep::ResolveNativeDependencies, e.into()))?;

        if !self.context_initialized.load(Ordering::Acquire) {
            debug!(step = %BootstrapStep::InitializeContext);
            self.engine
                .initialize_context()
                .map_err(|e| failed(BootstrapStep::InitializeContext, e.into()))?;
            self.context_initialized.store(true, Ordering::Release);
        }

        debug!(step = %BootstrapStep::ValidateConfiguration);
        let report = config.validate();
        if !report.is_valid() {
            return Err(LabelerError::InvalidConfiguration(report));
        }

        debug!(step = %BootstrapStep::CreateDelegates, proxied = transport.proxy.is_some());
        let auth = Arc::new(CredentialProvider::new(
            Arc::clone(&config),
            self.settings.authority_host.clone(),
            transport,
        ));

        debug!(step = %BootstrapStep::CreateContext);
        let cache_dir = self.settings.cache_root.join(&self.settings.application_name);
        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| failed(BootstrapStep::CreateContext, e.into()))?;
        let context = EngineContextSettings {
            application: ApplicationInfo {
                application_id: config.client_id.trim().to_string(),
                application_name: self.settings.application_name.clone(),
                application_version: self.settings.application_version.clone(),
            },
            cache_dir,
            log_level: EngineLogLevel::Error,
            min_tls: self.settings.min_tls,
        };

        debug!(step = %BootstrapStep::LoadProfile);
        let profile = self
            .engine
            .load_profile(ProfileSettings {
                context,
                auth,
                consent: Arc::new(AutoConsent),
            })
            .await
            .map_err(|e| failed(BootstrapStep::LoadProfile, e.into()))?;

        let identity = config
            .user_identity
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.settings.service_identity.as_str())
            .to_string();

        debug!(step = %BootstrapStep::AddEngine, identity = %identity);
        let file_engine = profile
            .add_engine(EngineSettings {
                name: self.settings.engine_name.clone(),
                identity: identity.clone(),
                cloud: self.settings.cloud.clone(),
                locale: ENGINE_LOCALE.to_string(),
            })
            .await
            .map_err(|e| failed(BootstrapStep::AddEngine, e.into()))?;

        info!(identity = %identity, engine = %self.settings.engine_name, "Engine session ready");

        Ok(EngineSession {
            file_engine,
            _profile: profile,
            identity,
            engine_name: self.settings.engine_name.clone(),
            native_dir,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        assert_eq!(BootstrapStep::AddEngine.to_string(), "add_engine");
        assert_eq!(
            BootstrapStep::ResolveNativeDependencies.to_string(),
            "resolve_native_dependencies"
        );
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
    }
}
