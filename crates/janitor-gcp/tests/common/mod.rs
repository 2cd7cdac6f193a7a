#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use janitor_core::{ApiConfig, Result};
use janitor_gcp::{ApiClient, Credential, CredentialManager, RetryPolicy, Scopes, TokenSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Issues `token-N` valid for an hour
#[derive(Default)]
pub struct CountingTokenSource {
    calls: AtomicUsize,
}

impl CountingTokenSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for CountingTokenSource {
    async fn fetch_token(&self, scopes: &Scopes) -> Result<Credential> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(
            format!("token-{}", n),
            Utc::now() + chrono::Duration::hours(1),
            scopes.clone(),
        ))
    }
}

pub struct TestClient {
    pub api: ApiClient,
    pub tokens: Arc<CountingTokenSource>,
}

/// Client with millisecond backoff and `max_attempts` requests per call
pub fn client(max_attempts: u32) -> TestClient {
    let tokens = Arc::new(CountingTokenSource::default());
    let credentials = Arc::new(CredentialManager::new(tokens.clone()));
    let api = ApiClient::new(credentials, Scopes::new(["cloud-platform"]), &ApiConfig::default())
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(max_attempts));
    TestClient { api, tokens }
}
