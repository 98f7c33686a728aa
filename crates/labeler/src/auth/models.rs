//! Token endpoint wire types.

use serde::{Deserialize, Serialize};

/// Form body for a client-credentials grant.
#[derive(Debug, Serialize)]
pub struct ClientCredentialsForm<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub scope: &'a str,
}

/// Successful token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// OAuth error body.
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}
