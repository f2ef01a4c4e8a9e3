//! Credential exchange: client id/secret → two-legged bearer token.
//!
//! One form-encoded POST with HTTP Basic auth and
//! `grant_type=client_credentials`. No retries: a rejected exchange ends the
//! session and the caller decides whether to open a new one.

use crate::error::ForgeError;
use crate::types::Credential;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchange the service identity for a bearer token.
///
/// # Errors
/// - [`ForgeError::Configuration`] if `client_id` or `client_secret` is
///   empty; no request is sent.
/// - [`ForgeError::Authentication`] on a non-2xx response, an unreachable
///   endpoint, or a body without `access_token`.
pub async fn acquire_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: &str,
) -> Result<Credential, ForgeError> {
    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        return Err(ForgeError::Configuration(
            "Client ID or client secret is missing".into(),
        ));
    }

    debug!("Requesting token from {} (scope: {})", token_url, scope);

    let response = client
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[("grant_type", "client_credentials"), ("scope", scope)])
        .send()
        .await
        .map_err(|e| ForgeError::Authentication {
            status: None,
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ForgeError::Authentication {
            status: Some(status.as_u16()),
            detail: body,
        });
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| ForgeError::Authentication {
            status: Some(status.as_u16()),
            detail: format!("Unreadable token response: {e}"),
        })?;

    if parsed.access_token.is_empty() {
        return Err(ForgeError::Authentication {
            status: Some(status.as_u16()),
            detail: "Response did not contain an access_token".into(),
        });
    }

    info!("Token acquired (expires in {:?}s)", parsed.expires_in);

    Ok(Credential {
        token: parsed.access_token,
        scope: scope.to_string(),
        expires_in: parsed.expires_in,
    })
}
