//! OAuth2 client-credentials client.

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::models::{ClientCredentialsForm, TokenErrorResponse, TokenResponse};
use crate::error::AuthError;

const GRANT_TYPE: &str = "client_credentials";

/// A directory-scoped confidential client.
///
/// Built once per credential provider and reused for every token request.
#[derive(Clone)]
pub struct ClientCredentialsClient {
    /// HTTP client.
    http: Client,
    /// Token endpoint derived from the authority.
    token_endpoint: Url,
    client_id: String,
    client_secret: String,
}

impl ClientCredentialsClient {
    /// Create a client for `authority` (e.g. `https://login.microsoftonline.com/<tenant>`).
    ///
    /// # Errors
    /// Returns `AuthError::InvalidAuthority` if the authority is not an
    /// absolute http(s) URL.
    pub fn new(
        http: Client,
        authority: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            http,
            token_endpoint: token_endpoint(authority)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Token endpoint requests are posted to.
    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    /// Request an access token for `scope`.
    ///
    /// # Errors
    /// Returns error if the request fails or the endpoint does not return a token.
    pub async fn acquire_token(&self, scope: &str) -> Result<String, AuthError> {
        debug!(endpoint = %self.token_endpoint, scope = %scope, "Requesting access token");

        let form = ClientCredentialsForm {
            grant_type: GRANT_TYPE,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            scope,
        };

        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let token: TokenResponse = serde_json::from_str(&text)
                .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
            if token.access_token.is_empty() {
                return Err(AuthError::InvalidResponse(
                    "access_token is empty".to_string(),
                ));
            }
            debug!(
                token_type = token.token_type.as_deref().unwrap_or("unknown"),
                expires_in = token.expires_in.unwrap_or_default(),
                "Access token acquired"
            );
            Ok(token.access_token)
        } else {
            match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(body) => {
                    warn!(
                        status = status.as_u16(),
                        error = %body.error,
                        correlation_id = body.correlation_id.as_deref().unwrap_or(""),
                        "Token request rejected"
                    );
                    Err(AuthError::Rejected {
                        status: status.as_u16(),
                        error: body.error,
                        description: body.error_description.unwrap_or_default(),
                    })
                }
                Err(_) => Err(AuthError::Rejected {
                    status: status.as_u16(),
                    error: "http_error".to_string(),
                    description: text,
                }),
            }
        }
    }
}

/// `{authority}/oauth2/v2.0/token`.
fn token_endpoint(authority: &str) -> Result<Url, AuthError> {
    let invalid = |reason: &str| AuthError::InvalidAuthority {
        authority: authority.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(authority.trim_end_matches('/')).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(invalid("scheme must be http or https"));
    }
    url.path_segments_mut()
        .map_err(|()| invalid("authority cannot be a base URL"))?
        .pop_if_empty()
        .extend(["oauth2", "v2.0", "token"]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_endpoint_from_authority() {
        let url = token_endpoint("https://login.microsoftonline.com/tenant-a").unwrap();
        assert_eq!(
            url.as_str(),
            "https://login.microsoftonline.com/tenant-a/oauth2/v2.0/token"
        );

        let url = token_endpoint("https://login.microsoftonline.com/tenant-a/").unwrap();
        assert_eq!(
            url.as_str(),
            "https://login.microsoftonline.com/tenant-a/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_token_endpoint_rejects_bad_authority() {
        assert!(matches!(
            token_endpoint("ftp://example.com/tenant"),
            Err(AuthError::InvalidAuthority { .. })
        ));
        assert!(matches!(
            token_endpoint("tenant-only"),
            Err(AuthError::InvalidAuthority { .. })
        ));
    }
}
