//! Values exchanged with the classification engine.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthDelegate, ConsentDelegate};
use crate::auth::MinTlsVersion;

/// Cloud the engine talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cloud {
    /// Commercial (worldwide) endpoints.
    #[default]
    Commercial,
    /// Explicit service endpoint.
    Custom(String),
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commercial => write!(f, "commercial"),
            Self::Custom(url) => write!(f, "custom({url})"),
        }
    }
}

/// Engine-side log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineLogLevel {
    Trace,
    Info,
    Warning,
    #[default]
    Error,
}

/// Identifies the calling application to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    /// Application (client) id registered with the directory.
    pub application_id: String,
    pub application_name: String,
    pub application_version: String,
}

/// Settings for the engine context a profile is loaded against.
#[derive(Debug, Clone)]
pub struct EngineContextSettings {
    pub application: ApplicationInfo,
    /// Directory for the engine's caches and logs.
    pub cache_dir: PathBuf,
    pub log_level: EngineLogLevel,
    /// Minimum TLS version for the engine's own network calls.
    pub min_tls: MinTlsVersion,
}

/// Settings for loading a file-operation profile.
#[derive(Clone)]
pub struct ProfileSettings {
    pub context: EngineContextSettings,
    /// Callback the engine uses to obtain bearer tokens.
    pub auth: Arc<dyn AuthDelegate>,
    /// Callback the engine uses to ask for consent.
    pub consent: Arc<dyn ConsentDelegate>,
}

impl fmt::Debug for ProfileSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileSettings")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Settings for adding a named engine to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Engine id within the profile.
    pub name: String,
    /// Identity the engine acts as.
    pub identity: String,
    pub cloud: Cloud,
    pub locale: String,
}

/// A token request issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Resource the token is for.
    pub resource: String,
    /// Authority suggested by the engine; may be empty.
    pub authority: String,
    /// Claims challenge, if any.
    pub claims: Option<String>,
}

impl TokenRequest {
    pub fn new(resource: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authority: authority.into(),
            claims: None,
        }
    }
}

/// Answer to an engine consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    AcceptAlways,
    Accept,
    Reject,
}

/// A sensitivity label known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }
}

/// How a label was assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    #[default]
    Standard,
    Privileged,
    Auto,
}

/// Label currently attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLabel {
    pub label: Label,
    pub assignment_method: AssignmentMethod,
    pub creation_time: Option<DateTime<Utc>>,
}

/// Options passed alongside a label when setting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelingOptions {
    pub assignment_method: AssignmentMethod,
    pub justification: String,
    /// Permit downgrading from a higher label with the justification above.
    pub downgrade_justified: bool,
}

impl LabelingOptions {
    /// Standard assignment with a justification.
    pub fn standard(justification: impl Into<String>) -> Self {
        Self {
            assignment_method: AssignmentMethod::Standard,
            justification: justification.into(),
            downgrade_justified: true,
        }
    }
}

/// Protection parameters for `set_label`. Defaults apply no override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionSettings {
    /// Act on behalf of this user when protecting content.
    pub delegated_user_email: Option<String>,
}

/// Request to open a file handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRequest {
    /// File read by the handler.
    pub source: PathBuf,
    /// Path the handler will commit to.
    pub destination: PathBuf,
    /// Whether the handler will modify content.
    pub modify: bool,
}
