//! Credential provider for the classification engine.
//!
//! The engine asks for bearer tokens through [`AuthDelegate`]; the
//! [`CredentialProvider`] answers with an OAuth2 client-credentials exchange
//! against the directory service:
//!
//! - the confidential client is built lazily on the first request and reused
//! - every request still performs a live token call scoped to `{resource}/.default`
//! - the transport honors a system or explicit HTTP proxy ([`TransportFactory`])

mod client;
mod models;
mod proxy;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub use client::ClientCredentialsClient;
pub use proxy::{MinTlsVersion, ProxyMode, Transport, TransportFactory};

use crate::config::{mask_identifier, LabelerConfig};
use crate::engine::{AuthDelegate, TokenRequest};
use crate::error::{AuthError, LabelerError, LabelerResult};

/// Scope requested for `resource`.
#[must_use]
pub fn scope_for_resource(resource: &str) -> String {
    if resource.ends_with('/') {
        format!("{resource}.default")
    } else {
        format!("{resource}/.default")
    }
}

/// Authentication delegate backed by a client-credentials grant.
pub struct CredentialProvider {
    config: Arc<LabelerConfig>,
    authority_host: String,
    transport: Transport,
    /// Confidential client, built once.
    client: OnceCell<Arc<ClientCredentialsClient>>,
    builds: AtomicUsize,
}

impl CredentialProvider {
    /// Create a provider. No network traffic happens until the first token request.
    pub fn new(
        config: Arc<LabelerConfig>,
        authority_host: impl Into<String>,
        transport: Transport,
    ) -> Self {
        Self {
            config,
            authority_host: authority_host.into(),
            transport,
            client: OnceCell::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Authority for the configured tenant.
    #[must_use]
    pub fn tenant_authority(&self) -> String {
        format!(
            "{}/{}",
            self.authority_host.trim_end_matches('/'),
            self.config.tenant_id.trim()
        )
    }

    /// Number of times the confidential client has been built.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Acquire a token for `resource`.
    ///
    /// `authority` is the one suggested by the engine; when empty the tenant
    /// authority is used. Only the first call's authority is used to build
    /// the client.
    ///
    /// # Errors
    /// Returns `AuthenticationFailed` with masked identifiers.
    pub async fn token_for(&self, resource: &str, authority: &str) -> LabelerResult<String> {
        let scope = scope_for_resource(resource);

        let result = async {
            let client = self.client(authority).await?;
            client.acquire_token(&scope).await
        }
        .await;

        result.map_err(|source| {
            warn!(resource = %resource, error = %source, "Token acquisition failed");
            LabelerError::AuthenticationFailed {
                resource: resource.to_string(),
                tenant_id: mask_identifier(&self.config.tenant_id),
                client_id: mask_identifier(&self.config.client_id),
                source,
            }
        })
    }

    async fn client(&self, authority: &str) -> Result<Arc<ClientCredentialsClient>, AuthError> {
        self.client
            .get_or_try_init(|| async {
                let authority = if authority.trim().is_empty() {
                    self.tenant_authority()
                } else {
                    authority.trim().to_string()
                };
                let client = ClientCredentialsClient::new(
                    self.transport.client.clone(),
                    &authority,
                    self.config.client_id.trim(),
                    self.config.client_secret.clone(),
                )?;
                self.builds.fetch_add(1, Ordering::SeqCst);
                info!(
                    endpoint = %client.token_endpoint(),
                    client = %mask_identifier(&self.config.client_id),
                    proxied = self.transport.proxy.is_some(),
                    "Built client-credentials application"
                );
                Ok::<_, AuthError>(Arc::new(client))
            })
            .await
            .map(Arc::clone)
    }
}

#[async_trait]
impl AuthDelegate for CredentialProvider {
    async fn acquire_token(&self, request: &TokenRequest) -> LabelerResult<String> {
        if request.claims.is_some() {
            debug!(resource = %request.resource, "Ignoring claims challenge for client-credentials grant");
        }
        self.token_for(&request.resource, &request.authority).await
    }
}
