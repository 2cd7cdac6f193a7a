//! Credential acquisition and caching
//!
//! [`CredentialManager`] hands out bearer tokens per scope set. A cached token
//! is returned without I/O while it has more than [`REFRESH_MARGIN`] left;
//! otherwise one refresh runs and every concurrent caller for the same scope
//! set waits on it (single-flight).
//!
//! The refresh is a lazily driven shared future, not a spawned task: if every
//! waiter is cancelled the refresh stops with them, and the next caller
//! resumes it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use janitor_core::{Error, Result};

/// Prefix for short scope names such as `cloud-platform`
pub const SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";

/// Minimum remaining lifetime for a cached token to be handed out
pub const REFRESH_MARGIN: chrono::Duration = chrono::Duration::seconds(60);

/// A normalized set of authorization scopes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scopes(BTreeSet<String>);

impl Scopes {
    /// Build a scope set, expanding short names to full scope URLs
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            scopes
                .into_iter()
                .map(|scope| scope.as_ref().trim().to_string())
                .filter(|scope| !scope.is_empty())
                .map(|scope| {
                    if scope.starts_with("https://") {
                        scope
                    } else {
                        format!("{}{}", SCOPE_PREFIX, scope)
                    }
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Space-separated, as the token endpoint expects
impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(" "))
    }
}

/// A bearer token with its expiry and granted scopes
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expiry: DateTime<Utc>,
    scopes: Scopes,
}

impl Credential {
    pub fn new(token: impl Into<String>, expiry: DateTime<Utc>, scopes: Scopes) -> Self {
        Self {
            token: token.into(),
            expiry,
            scopes,
        }
    }

    /// The bearer token
    /// ⚠️ NEVER log this value
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Whether the token outlives `now + margin`
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expiry > now + margin
    }
}

// Custom Debug implementation that hides the token
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<REDACTED>")
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Trait for identity-provider implementations
///
/// Called only by [`CredentialManager`], at most once at a time per scope
/// set. Implementations should not cache.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Exchange the service credential for a fresh token
    async fn fetch_token(&self, scopes: &Scopes) -> Result<Credential>;
}

type SharedRefresh = Shared<BoxFuture<'static, std::result::Result<Credential, String>>>;

#[derive(Default)]
struct Slot {
    cached: Option<Credential>,
    in_flight: Option<SharedRefresh>,
}

/// Caches tokens per scope set with single-flight refresh
pub struct CredentialManager {
    source: Arc<dyn TokenSource>,
    slots: Mutex<HashMap<Scopes, Slot>>,
    margin: chrono::Duration,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
            margin: REFRESH_MARGIN,
        }
    }

    /// Override the refresh margin
    pub fn with_margin(mut self, margin: chrono::Duration) -> Self {
        self.margin = margin;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Scopes, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a token for `scopes`, refreshing if needed
    ///
    /// # Errors
    ///
    /// `Error::Auth` if the refresh fails. A previously cached token is kept
    /// and the next call starts a new refresh.
    pub async fn token(&self, scopes: &Scopes) -> Result<Credential> {
        let refresh = {
            let mut slots = self.lock();
            let slot = slots.entry(scopes.clone()).or_default();

            if let Some(cached) = &slot.cached {
                if cached.is_fresh(Utc::now(), self.margin) {
                    return Ok(cached.clone());
                }
            }

            match &slot.in_flight {
                Some(refresh) => refresh.clone(),
                None => {
                    debug!("Refreshing token for scopes [{}]", scopes);
                    let refresh = self.refresh(scopes.clone());
                    slot.in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        let result = refresh.clone().await;

        {
            let mut slots = self.lock();
            if let Some(slot) = slots.get_mut(scopes) {
                let ours = slot
                    .in_flight
                    .as_ref()
                    .is_some_and(|current| Shared::ptr_eq(current, &refresh));
                if ours {
                    slot.in_flight = None;
                    if let Ok(credential) = &result {
                        info!("Obtained token for scopes [{}], expires {}", scopes, credential.expiry());
                        slot.cached = Some(credential.clone());
                    }
                }
            }
        }

        result.map_err(Error::Auth)
    }

    /// Drop the cached token so the next call refreshes
    pub fn invalidate(&self, scopes: &Scopes) {
        if let Some(slot) = self.lock().get_mut(scopes) {
            slot.cached = None;
        }
    }

    /// The cached token, fresh or not
    pub fn cached(&self, scopes: &Scopes) -> Option<Credential> {
        self.lock().get(scopes).and_then(|slot| slot.cached.clone())
    }

    fn refresh(&self, scopes: Scopes) -> SharedRefresh {
        let source = self.source.clone();
        async move {
            let credential = source.fetch_token(&scopes).await.map_err(|err| match err {
                Error::Auth(message) => message,
                other => other.to_string(),
            })?;

            // Never hand out or cache a token that is already expired
            if credential.expiry() <= Utc::now() {
                return Err(format!(
                    "identity provider issued a token that expired at {}",
                    credential.expiry()
                ));
            }
            Ok(credential)
        }
        .boxed()
        .shared()
    }
}
