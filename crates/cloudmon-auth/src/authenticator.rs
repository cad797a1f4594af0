//! Token authentication against the identity service.
//!
//! A single POST exchanges a username/API-key pair for a bearer token and
//! the service catalog. Nothing here retries or caches; the connection owns
//! the cached session.

use cloudmon_core::{
    CloudmonError, Credentials, HttpRequest, Result, ServiceCatalog, Transport,
};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// Bearer token sent as `X-Auth-Token` on every API request
    pub token: String,

    /// Catalog of services available to the account
    pub catalog: ServiceCatalog,
}

#[derive(Serialize)]
struct AuthRequestBody<'a> {
    credentials: CredentialsBody<'a>,
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct AuthEnvelope {
    auth: AuthBody,
}

#[derive(Deserialize)]
struct AuthBody {
    token: TokenBody,
    #[serde(rename = "serviceCatalog")]
    service_catalog: ServiceCatalog,
}

#[derive(Deserialize)]
struct TokenBody {
    id: String,
}

/// Exchanges credentials for a token and service catalog.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    auth_url: String,
}

impl TokenAuthenticator {
    /// Create an authenticator for the given identity base URL
    /// (e.g. `https://auth.api.rackspacecloud.com/v1.1`).
    pub fn new<S: Into<String>>(auth_url: S) -> Self {
        let auth_url: String = auth_url.into();
        Self {
            auth_url: auth_url.trim_end_matches('/').to_string(),
        }
    }

    /// Identity base URL
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// URL the credentials are posted to
    pub fn auth_endpoint(&self) -> String {
        format!("{}/auth", self.auth_url)
    }

    /// Authenticate once.
    ///
    /// Credentials go both in the JSON body and in the `X-Auth-User` /
    /// `X-Auth-Key` headers, since identity deployments differ in which one
    /// they read.
    ///
    /// - 200 with a parsable body: token + catalog
    /// - 401: [`CloudmonError::InvalidCredentials`]
    /// - any other status: [`CloudmonError::InvalidCredentials`] with the status
    ///   and a body excerpt
    /// - unparsable 200 body: [`CloudmonError::MalformedResponse`] with the body
    pub async fn authenticate(
        &self,
        transport: &dyn Transport,
        credentials: &Credentials,
    ) -> Result<AuthResult> {
        let body = serde_json::to_string(&AuthRequestBody {
            credentials: CredentialsBody {
                username: &credentials.username,
                key: &credentials.api_key,
            },
        })?;

        let request = HttpRequest::new(Method::POST, self.auth_endpoint())
            .with_header("Accept", "application/json")?
            .with_header("Content-Type", "application/json; charset=UTF-8")?
            .with_header("X-Auth-User", &credentials.username)?
            .with_header("X-Auth-Key", &credentials.api_key)?
            .with_body(body);

        tracing::debug!(
            "authenticating user '{}' against {}",
            credentials.username,
            request.url
        );

        let response = transport.send(request).await?;

        match response.status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                tracing::warn!(
                    "auth endpoint rejected credentials for user '{}'",
                    credentials.username
                );
                return Err(CloudmonError::rejected_credentials(&response.body));
            }
            other => {
                tracing::warn!(
                    "auth endpoint returned unexpected status {} for user '{}'",
                    other,
                    credentials.username
                );
                return Err(CloudmonError::unexpected_auth_status(
                    other.as_u16(),
                    &response.body,
                ));
            }
        }

        let envelope: AuthEnvelope = serde_json::from_str(&response.body).map_err(|e| {
            CloudmonError::malformed(
                format!("failed to parse auth response: {}", e),
                &response.body,
            )
        })?;

        let token = envelope.auth.token.id;
        if token.is_empty() {
            return Err(CloudmonError::malformed(
                "auth response carried an empty token",
                &response.body,
            ));
        }

        tracing::info!(
            "authenticated user '{}'; catalog lists {} services",
            credentials.username,
            envelope.auth.service_catalog.len()
        );

        Ok(AuthResult {
            token,
            catalog: envelope.auth.service_catalog,
        })
    }
}
