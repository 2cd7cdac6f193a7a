// # Google API Client
//
// Authenticated HTTP client shared by every resource client in this crate.
//
// ## Request lifecycle
//
// 1. Wait for a rate-limit slot (if a limiter is configured)
// 2. Obtain a bearer token from the `CredentialManager`
// 3. Send the request with the default headers
// 4. Classify the response:
//    - 2xx: return the body
//    - 401: invalidate the token and resend, at most `MAX_REFRESH_ATTEMPTS`
//      times; these resends are not counted against the retry budget
//    - 429 / 5xx / connection failure: back off and resend until
//      `max_attempts` requests have been issued, then `Error::Transient`
//    - any other status: `Error::Api` immediately
//
// Retries live here and nowhere else. The reconciliation engine never
// retries on its own; it only decides whether to acknowledge.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use janitor_core::{ApiConfig, Error, Result};

use crate::auth::{CredentialManager, Scopes};
use crate::paginate::{Items, Paginator};
use crate::rate_limit::RateLimiter;
use crate::retry::{is_retryable_status, retry_after, RetryPolicy};

/// Resends allowed after a 401 with a refreshed token
pub const MAX_REFRESH_ATTEMPTS: u32 = 2;

/// Sent as both `User-Agent` and `X-Goog-API-Client`
const CLIENT_ID: &str = concat!("dns-janitor/", env!("CARGO_PKG_VERSION"));

/// A successful response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::from_str("{}")?);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Authenticated, rate-limited, retrying HTTP client for Google APIs
///
/// Cheap to clone; clones share the credential cache and rate limiter.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    credentials: Arc<CredentialManager>,
    scopes: Scopes,
    policy: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("scopes", &self.scopes)
            .field("policy", &self.policy)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client from the `[api]` configuration
    ///
    /// # Errors
    ///
    /// `Error::Config` if the HTTP client cannot be constructed.
    pub fn new(credentials: Arc<CredentialManager>, scopes: Scopes, config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(default_headers())
            .gzip(true)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let limiter = (config.requests_per_window > 0).then(|| {
            Arc::new(RateLimiter::new(
                config.requests_per_window,
                Duration::from_secs(config.window_secs),
            ))
        });

        Ok(Self {
            http,
            credentials,
            scopes,
            policy: RetryPolicy::from_config(config),
            limiter,
        })
    }

    /// Replace the underlying HTTP client (connection pooling, proxies)
    ///
    /// Default headers are still added per request.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a rate limiter with other clients
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Issue a request, retrying per the client's policy
    ///
    /// # Errors
    ///
    /// - `Error::Auth` if no token can be obtained
    /// - `Error::Api` for a non-retryable status, including a 401 that
    ///   survives `MAX_REFRESH_ATTEMPTS` refreshes
    /// - `Error::Transient` once the retry budget is exhausted
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        params: &[(String, String)],
    ) -> Result<ApiResponse> {
        let mut backoff = self.policy.backoff();
        let mut attempts: u32 = 0;
        let mut refreshes: u32 = 0;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            let credential = self.credentials.token(&self.scopes).await?;

            debug!("Request: \"{} {}\"", method, url);
            let mut request = self
                .http
                .request(method.clone(), url)
                .headers(default_headers())
                .bearer_auth(credential.token())
                .query(params);
            if let Some(body) = body {
                request = request.json(body);
            }

            let (failure, hint) = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!("Response: \"{} {}\" {}", method, url, status);

                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(ApiResponse { status, body }),
                            Err(e) => (format!("failed to read response body: {}", e), None),
                        }
                    } else if status == StatusCode::UNAUTHORIZED {
                        if refreshes >= MAX_REFRESH_ATTEMPTS {
                            warn!(
                                "\"{} {}\" still unauthorized after {} token refresh(es)",
                                method, url, refreshes
                            );
                            let body = response.text().await.unwrap_or_default();
                            return Err(Error::api(status.as_u16(), body));
                        }
                        refreshes += 1;
                        info!(
                            "Unauthorized response for \"{} {}\", refreshing token (attempt {}/{})",
                            method, url, refreshes, MAX_REFRESH_ATTEMPTS
                        );
                        self.credentials.invalidate(&self.scopes);
                        continue;
                    } else {
                        let hint = retry_after(response.headers());
                        let body = response.text().await.unwrap_or_default();
                        if !is_retryable_status(status) {
                            return Err(Error::api(status.as_u16(), body));
                        }
                        (format!("HTTP {}", status.as_u16()), hint)
                    }
                }
                Err(e) => (format!("request failed: {}", e), None),
            };

            attempts += 1;
            if attempts >= self.policy.max_attempts {
                warn!(
                    "Giving up on \"{} {}\" after {} attempt(s): {}",
                    method, url, attempts, failure
                );
                return Err(Error::transient(attempts, failure));
            }

            let delay = self.policy.delay(backoff.next_backoff(), hint);
            warn!(
                "Transient failure for \"{} {}\" ({}), retrying in {:?} (attempt {}/{})",
                method, url, failure, delay, attempts, self.policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// GET and decode a JSON body
    ///
    /// # Errors
    ///
    /// As [`ApiClient::request`], plus `Error::Json` if the body does not
    /// decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(String, String)]) -> Result<T> {
        self.request(Method::GET, url, None, params).await?.json()
    }

    /// Lazily page through a list endpoint
    ///
    /// Items are read from `items_field` of each page; the next page is
    /// requested only once the current one is consumed. The continuation
    /// token is read from `nextPageToken` unless overridden with
    /// [`Items::with_token_field`].
    pub fn paginate<T: DeserializeOwned>(
        &self,
        method: Method,
        url: impl Into<String>,
        params: Vec<(String, String)>,
        items_field: impl Into<String>,
    ) -> Items<T> {
        Items::new(Paginator::new(self.clone(), method, url, params), items_field)
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_ID));
    headers.insert("x-goog-api-client", HeaderValue::from_static(CLIENT_ID));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    headers
}
