//! HTTP transport for the token endpoint, with proxy and TLS settings.

use std::env;
use std::fmt;
use std::time::Duration;

use reqwest::{Client, NoProxy, Proxy};
use tracing::{debug, info};

use crate::error::AuthError;

/// Proxy variables checked in `System` mode, in order.
const PROXY_ENV_VARS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "HTTP_PROXY",
    "http_proxy",
];

/// How the token transport picks a proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyMode {
    /// Use the proxy named by the standard environment variables, if any.
    #[default]
    System,
    /// Always use this proxy URL.
    Explicit(String),
    /// Connect directly.
    Disabled,
}

/// Minimum TLS version for outbound connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MinTlsVersion {
    #[default]
    Tls12,
    Tls13,
}

impl MinTlsVersion {
    fn as_reqwest(self) -> reqwest::tls::Version {
        match self {
            Self::Tls12 => reqwest::tls::Version::TLS_1_2,
            Self::Tls13 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

impl fmt::Display for MinTlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls12 => write!(f, "TLS 1.2"),
            Self::Tls13 => write!(f, "TLS 1.3"),
        }
    }
}

/// A configured HTTP client plus the proxy it routes through.
#[derive(Debug, Clone)]
pub struct Transport {
    pub client: Client,
    pub proxy: Option<String>,
}

/// Builds [`Transport`]s for the credential provider.
#[derive(Debug, Clone)]
pub struct TransportFactory {
    proxy: ProxyMode,
    min_tls: MinTlsVersion,
    timeout: Duration,
}

impl TransportFactory {
    #[must_use]
    pub const fn new(proxy: ProxyMode, min_tls: MinTlsVersion, timeout: Duration) -> Self {
        Self {
            proxy,
            min_tls,
            timeout,
        }
    }

    /// Proxy URL that `build` would route through.
    #[must_use]
    pub fn detect_proxy(&self) -> Option<String> {
        match &self.proxy {
            ProxyMode::System => system_proxy(),
            ProxyMode::Explicit(url) => Some(url.clone()),
            ProxyMode::Disabled => None,
        }
    }

    /// Build the HTTP client.
    ///
    /// # Errors
    /// Returns `AuthError::Proxy` for an unusable proxy URL and
    /// `AuthError::Http` if the client cannot be created.
    pub fn build(&self) -> Result<Transport, AuthError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .min_tls_version(self.min_tls.as_reqwest())
            .no_proxy();

        let proxy = self.detect_proxy();
        if let Some(url) = &proxy {
            let mut route = Proxy::all(url.as_str()).map_err(|e| AuthError::Proxy {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            if self.proxy == ProxyMode::System {
                route = route.no_proxy(NoProxy::from_env());
            }
            builder = builder.proxy(route);
            info!(proxy = %url, "Routing token requests through proxy");
        } else {
            debug!("No proxy configured for token requests");
        }

        Ok(Transport {
            client: builder.build()?,
            proxy,
        })
    }
}

fn system_proxy() -> Option<String> {
    PROXY_ENV_VARS.iter().find_map(|name| {
        env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
