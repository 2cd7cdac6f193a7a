//! Service-account token source
//!
//! Exchanges a signed JWT assertion for an OAuth2 access token
//! (RFC 7523 `jwt-bearer` grant) using a service-account JSON keyfile.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use janitor_core::{Error, Result};

use crate::auth::{Credential, Scopes, TokenSource};
use crate::retry::{is_retryable_status, RetryPolicy};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Requested assertion lifetime; Google caps it at one hour
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Token endpoint requests per refresh
const TOKEN_ATTEMPTS: u32 = 3;

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: Option<String>,
    private_key: Option<String>,
    private_key_id: Option<String>,
    token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Obtains tokens for a Google service account
pub struct ServiceAccountTokenSource {
    client_email: String,
    key_id: Option<String>,
    encoding_key: EncodingKey,
    token_uri: String,
    http: reqwest::Client,
    policy: RetryPolicy,
}

// Custom Debug implementation that hides the signing key
impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("encoding_key", &"<REDACTED>")
            .finish()
    }
}

impl ServiceAccountTokenSource {
    /// Load a keyfile from disk
    ///
    /// # Errors
    ///
    /// `Error::Config` if the file cannot be read or is not a usable
    /// service-account key.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read keyfile {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
            .map_err(|e| Error::config(format!("keyfile {}: {}", path.display(), e)))
    }

    /// Parse keyfile contents
    pub fn from_json(contents: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(contents)
            .map_err(|e| Error::config(format!("not a service-account key: {}", e)))?;

        let client_email = key
            .client_email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| Error::config("service-account key has no client_email"))?;
        let private_key = key
            .private_key
            .filter(|pem| !pem.is_empty())
            .ok_or_else(|| Error::config("service-account key has no private_key"))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_key.as_bytes())
            .map_err(|e| Error::config(format!("invalid private_key: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client_email,
            key_id: key.private_key_id,
            encoding_key,
            token_uri: key.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            http,
            policy: RetryPolicy::default(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn assertion(&self, scopes: &Scopes) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: scopes.to_string(),
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| Error::auth(format!("failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn fetch_token(&self, scopes: &Scopes) -> Result<Credential> {
        let assertion = self.assertion(scopes)?;
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let attempts = TOKEN_ATTEMPTS.min(self.policy.max_attempts).max(1);
        let mut backoff = self.policy.backoff();
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            debug!("Requesting token for {} from {}", self.client_email, self.token_uri);
            match self.http.post(&self.token_uri).form(&form).send().await {
                Ok(response) if response.status().is_success() => {
                    let token: TokenResponse = response
                        .json()
                        .await
                        .map_err(|e| Error::auth(format!("unexpected token response: {}", e)))?;
                    let expiry = chrono::Duration::try_seconds(token.expires_in)
                        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                        .ok_or_else(|| {
                            Error::auth(format!(
                                "token endpoint returned invalid expires_in {}",
                                token.expires_in
                            ))
                        })?;
                    return Ok(Credential::new(token.access_token, expiry, scopes.clone()));
                }
                Ok(response) if !is_retryable_status(response.status()) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::auth(format!(
                        "token endpoint rejected {} (HTTP {}): {}",
                        self.client_email,
                        status.as_u16(),
                        body
                    )));
                }
                Ok(response) => last_failure = format!("HTTP {}", response.status().as_u16()),
                Err(e) => last_failure = format!("request failed: {}", e),
            }

            if attempt < attempts {
                let delay = backoff.next_backoff();
                warn!(
                    "Token request failed ({}), retrying in {:?} (attempt {}/{})",
                    last_failure, delay, attempt, attempts
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(Error::auth(format!(
            "token endpoint unavailable after {} attempt(s): {}",
            attempts, last_failure
        )))
    }
}
