//! Tenant and application configuration.
//!
//! [`LabelerConfig`] holds the service-account credentials and the default
//! label. [`ConfigStore`] is the caller-owned holder shared by the session
//! manager and the labeling orchestrator; [`LabelerSettings`] carries the
//! non-credential knobs used during bootstrap.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::{MinTlsVersion, ProxyMode};
use crate::engine::Cloud;
use crate::error::{LabelerError, LabelerResult};
use crate::native::NativeSearch;

const ENV_TENANT_ID: &str = "LABELER_TENANT_ID";
const ENV_CLIENT_ID: &str = "LABELER_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "LABELER_CLIENT_SECRET";
const ENV_DEFAULT_LABEL_ID: &str = "LABELER_DEFAULT_LABEL_ID";
const ENV_USER_IDENTITY: &str = "LABELER_USER_IDENTITY";

/// Default directory service authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Identity used for the engine when no user identity is configured.
pub const DEFAULT_SERVICE_IDENTITY: &str = "labeling-service@localhost";

/// Default timeout for token requests.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Service-account credentials and labeling defaults.
#[derive(Clone, PartialEq, Eq)]
pub struct LabelerConfig {
    /// Directory (tenant) id, GUID.
    pub tenant_id: String,
    /// Application (client) id, GUID.
    pub client_id: String,
    /// Application secret.
    pub client_secret: String,
    /// Label applied when the caller does not name one, GUID.
    pub default_label_id: String,
    /// Identity the engine session is bound to.
    pub user_identity: Option<String>,
}

impl LabelerConfig {
    /// Create a configuration without a user identity.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        default_label_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            default_label_id: default_label_id.into(),
            user_identity: None,
        }
    }

    /// Bind the engine session to a specific identity.
    #[must_use]
    pub fn with_user_identity(mut self, identity: impl Into<String>) -> Self {
        self.user_identity = Some(identity.into());
        self
    }

    /// Load configuration from `LABELER_*` environment variables.
    ///
    /// Missing variables become empty strings so that [`ConfigStore::configure`]
    /// reports them.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).unwrap_or_default();
        Self {
            tenant_id: var(ENV_TENANT_ID),
            client_id: var(ENV_CLIENT_ID),
            client_secret: var(ENV_CLIENT_SECRET),
            default_label_id: var(ENV_DEFAULT_LABEL_ID),
            user_identity: env::var(ENV_USER_IDENTITY)
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    /// Non-secret view used in error messages and logs.
    #[must_use]
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            default_label_id: self.default_label_id.clone(),
            user_identity: self.user_identity.clone(),
        }
    }

    /// Check every field without side effects.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut violations = Vec::new();

        for (field, value, guid) in [
            (ConfigField::TenantId, &self.tenant_id, true),
            (ConfigField::ClientId, &self.client_id, true),
            (ConfigField::ClientSecret, &self.client_secret, false),
            (ConfigField::DefaultLabelId, &self.default_label_id, true),
        ] {
            if value.trim().is_empty() {
                violations.push(ConfigViolation::new(field, ViolationKind::Empty));
            } else if guid && Uuid::parse_str(value.trim()).is_err() {
                violations.push(ConfigViolation::new(field, ViolationKind::NotAGuid));
            }
        }

        if let Some(identity) = self.user_identity.as_deref() {
            if !identity.trim().is_empty() && !identity.contains('@') {
                violations.push(ConfigViolation::new(
                    ConfigField::UserIdentity,
                    ViolationKind::NotAnEmail,
                ));
            }
        }

        ValidationReport { violations }
    }

    /// Reject tuples with an empty required field.
    fn ensure_required(&self) -> LabelerResult<()> {
        let empty: Vec<&str> = [
            (ConfigField::TenantId, &self.tenant_id),
            (ConfigField::ClientId, &self.client_id),
            (ConfigField::ClientSecret, &self.client_secret),
            (ConfigField::DefaultLabelId, &self.default_label_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field.as_str())
        .collect();

        if empty.is_empty() {
            Ok(())
        } else {
            Err(LabelerError::InvalidArgument(format!(
                "required configuration fields are empty: {}",
                empty.join(", ")
            )))
        }
    }
}

impl fmt::Debug for LabelerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelerConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("default_label_id", &self.default_label_id)
            .field("user_identity", &self.user_identity)
            .finish()
    }
}

/// Non-secret parts of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub tenant_id: String,
    pub client_id: String,
    pub default_label_id: String,
    pub user_identity: Option<String>,
}

impl fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tenant={}, client={}, default_label={}",
            self.tenant_id, self.client_id, self.default_label_id
        )?;
        if let Some(identity) = &self.user_identity {
            write!(f, ", identity={identity}")?;
        }
        Ok(())
    }
}

/// Configuration field names, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigField {
    TenantId,
    ClientId,
    ClientSecret,
    DefaultLabelId,
    UserIdentity,
}

impl ConfigField {
    /// Caller-facing field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TenantId => "tenantId",
            Self::ClientId => "clientId",
            Self::ClientSecret => "clientSecret",
            Self::DefaultLabelId => "defaultLabelId",
            Self::UserIdentity => "userIdentity",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Empty,
    NotAGuid,
    NotAnEmail,
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigViolation {
    pub field: ConfigField,
    pub kind: ViolationKind,
}

impl ConfigViolation {
    #[must_use]
    pub const fn new(field: ConfigField, kind: ViolationKind) -> Self {
        Self { field, kind }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::Empty => write!(f, "{} is empty", self.field),
            ViolationKind::NotAGuid => write!(f, "{} is not a valid GUID", self.field),
            ViolationKind::NotAnEmail => write!(f, "{} is not an email address", self.field),
        }
    }
}

/// Result of [`LabelerConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<ConfigViolation>,
}

impl ValidationReport {
    /// Report for a store that was never configured.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            violations: [
                ConfigField::TenantId,
                ConfigField::ClientId,
                ConfigField::ClientSecret,
                ConfigField::DefaultLabelId,
            ]
            .into_iter()
            .map(|field| ConfigViolation::new(field, ViolationKind::Empty))
            .collect(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether a given field has any violation.
    #[must_use]
    pub fn has(&self, field: ConfigField) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return f.write_str("valid");
        }
        let joined: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join("; "))
    }
}

/// Caller-owned configuration holder.
///
/// `configure` swaps the whole tuple, so readers observe either the old or
/// the new configuration.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Option<Arc<LabelerConfig>>>,
}

impl ConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `config`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a required field is empty.
    pub fn with_config(config: LabelerConfig) -> LabelerResult<Self> {
        let store = Self::new();
        store.configure(config)?;
        Ok(store)
    }

    /// Replace the current configuration.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a required field is empty; the stored
    /// configuration is left unchanged.
    pub fn configure(&self, config: LabelerConfig) -> LabelerResult<()> {
        config.ensure_required()?;
        let config = Arc::new(config);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
        Ok(())
    }

    /// Current configuration, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<LabelerConfig>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Validate the stored configuration.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        self.snapshot()
            .map_or_else(ValidationReport::unconfigured, |config| config.validate())
    }
}

/// Non-credential settings used while bootstrapping the engine session.
#[derive(Debug, Clone)]
pub struct LabelerSettings {
    /// Directory service host; the tenant id is appended to form the authority.
    pub authority_host: String,
    /// Application name reported to the engine.
    pub application_name: String,
    /// Application version reported to the engine.
    pub application_version: String,
    /// Name of the engine added to the file profile.
    pub engine_name: String,
    /// Root of the engine's on-disk cache.
    pub cache_root: PathBuf,
    pub cloud: Cloud,
    pub proxy: ProxyMode,
    pub native: NativeSearch,
    /// Identity used when the configuration has none.
    pub service_identity: String,
    pub min_tls: MinTlsVersion,
    pub http_timeout: Duration,
}

impl Default for LabelerSettings {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            application_name: env!("CARGO_PKG_NAME").to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            engine_name: "labeler-file-engine".to_string(),
            cache_root: env::temp_dir().join("labeler"),
            cloud: Cloud::Commercial,
            proxy: ProxyMode::System,
            native: NativeSearch::default(),
            service_identity: DEFAULT_SERVICE_IDENTITY.to_string(),
            min_tls: MinTlsVersion::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Mask an identifier for logs and error messages (`1111…1111`).
#[must_use]
pub fn mask_identifier(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
