//! OpenID Connect password-grant login against the HPC platform

use crate::config::{AUTH_CLIENT_ID, AUTH_REALM, AUTH_TIMEOUT};
use crate::error::{WardenError, WardenResult};
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: Option<String>,
    error_description: Option<String>,
}

/// Token endpoint below a cluster URL such as `https://host:3000/hps`.
pub fn token_endpoint(url: &str) -> WardenResult<Url> {
    let endpoint = format!(
        "{}/auth/realms/{}/protocol/openid-connect/token",
        url.trim_end_matches('/'),
        AUTH_REALM
    );
    Url::parse(&endpoint).map_err(|err| WardenError::Validation {
        message: format!("invalid cluster URL '{url}': {err}"),
        field: Some("url".to_string()),
        value: Some(url.to_string()),
    })
}

/// HTTP client for cluster requests.
///
/// Cluster certificates are commonly self-signed, so they are not verified.
pub(crate) fn http_client() -> WardenResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(AUTH_TIMEOUT)
        .build()?)
}

/// Authenticate and return the access token.
pub async fn login(url: &str, user: &str, password: &str) -> WardenResult<String> {
    let endpoint = token_endpoint(url)?;
    let client = http_client()?;

    debug!(endpoint = %endpoint, user, "requesting access token");
    let response = client
        .post(endpoint)
        .form(&[
            ("client_id", AUTH_CLIENT_ID),
            ("grant_type", "password"),
            ("username", user),
            ("password", password),
            ("scope", "openid"),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<TokenError>(&body)
            .ok()
            .and_then(|err| err.error_description.or(err.error))
            .unwrap_or_else(|| status.to_string());
        return Err(WardenError::Auth {
            message: reason,
            source: None,
        });
    }

    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/hps/auth/realms/rep/protocol/openid-connect/token";

    #[test]
    fn endpoint_is_below_cluster_url() {
        let endpoint = token_endpoint("https://cluster:3000/hps/").unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://cluster:3000/hps/auth/realms/rep/protocol/openid-connect/token"
        );

        assert!(token_endpoint("not a url").is_err());
    }

    #[tokio::test]
    async fn login_returns_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=me"))
            .and(body_string_contains("client_id=rep-cli"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "abc123" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = login(&format!("{}/hps", server.uri()), "me", "secret")
            .await
            .unwrap();

        assert_eq!(token, "abc123");
    }

    #[tokio::test]
    async fn rejected_login_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            })))
            .mount(&server)
            .await;

        let err = login(&format!("{}/hps", server.uri()), "me", "wrong")
            .await
            .unwrap_err();

        assert!(err.user_message().contains("Invalid user credentials"));
    }
}
