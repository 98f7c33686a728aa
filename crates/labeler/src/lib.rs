//! Headless sensitivity labeling for Office documents.
//!
//! This crate attaches a sensitivity label to a document and reads it back,
//! authenticating against the directory service with service-account
//! (client-credentials) credentials. Document internals are rewritten by an
//! external classification engine behind the [`engine`] traits.
//!
//! # Usage
//!
//! ```no_run
//! # async fn run(engine: std::sync::Arc<dyn labeler::ClassificationEngine>) -> anyhow::Result<()> {
//! use labeler::{Labeler, LabelerConfig, LabelerSettings};
//!
//! let config = LabelerConfig::new(
//!     "11111111-1111-1111-1111-111111111111",
//!     "22222222-2222-2222-2222-222222222222",
//!     "client-secret",
//!     "33333333-3333-3333-3333-333333333333",
//! );
//! let labeler = Labeler::create(engine, config, LabelerSettings::default())?;
//!
//! labeler.apply_label_to_word_file("/data/report.docx", None, None).await?;
//! let label = labeler.get_applied_label_id("/data/report.docx").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`ConfigStore`] holds credentials and the default label
//! - [`SessionManager`] bootstraps the engine session exactly once
//! - [`CredentialProvider`] answers the engine's token requests
//! - [`Labeler`] runs the validate, stage, commit, replace protocol per file
//! - [`blocking::Labeler`] exposes the same operations as blocking calls

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod blocking;
pub mod config;
pub mod engine;
pub mod error;
pub mod labeling;
pub mod logging;
pub mod native;
pub mod session;

pub use auth::{CredentialProvider, MinTlsVersion, ProxyMode, TransportFactory};
pub use config::{
    ConfigField, ConfigStore, ConfigSummary, ConfigViolation, LabelerConfig, LabelerSettings,
    ValidationReport, ViolationKind,
};
pub use engine::{
    AuthDelegate, ClassificationEngine, ConsentDelegate, FileEngine, FileHandler, FileProfile,
};
pub use error::{AuthError, EngineError, LabelerError, LabelerResult, OperationError};
pub use labeling::{ApplyOutcome, FileKind, LabelStep, Labeler, Operation};
pub use native::NativeSearch;
pub use session::{BootstrapStep, EngineSession, SessionManager, SessionStatus};
