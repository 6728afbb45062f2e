//! Bearer credentials for the direct transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{RemoteError, map_reqwest_error};

/// Tokens issued within this many seconds are treated as the same grant: a
/// caller forcing a refresh right after another caller refreshed gets the
/// token that refresh produced instead of burning a second grant.
const REFRESH_COALESCE_SECS: i64 = 10;

/// A token is never used in its final seconds.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Clone)]
pub struct AccessToken {
    secret: SecretString,
}

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(raw.into()),
        }
    }

    /// Only call at the point a request is signed.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Source of bearer credentials. `Ok(None)` means no usable credential and
/// the caller should take the gateway path.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, force_refresh: bool) -> Result<Option<AccessToken>, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: Option<i64>,
}

struct CachedToken {
    token: AccessToken,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Refresh-token grant against an OAuth token endpoint. The cached token
/// lives behind a mutex so concurrent forced refreshes serialize and share
/// one freshly-issued credential.
pub struct HttpTokenProvider {
    http: Client,
    token_url: String,
    client_id: String,
    refresh_token: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl HttpTokenProvider {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("choreboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            refresh_token: SecretString::from(refresh_token.into()),
            cached: Mutex::new(None),
        })
    }

    async fn refresh(&self) -> Result<Option<CachedToken>, RemoteError> {
        let res = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", self.refresh_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if status.is_client_error() {
            // The grant itself was rejected; there is no credential to be had.
            warn!(status = %status, "token refresh rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let grant: TokenGrant = res
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        let now = Utc::now();
        let lifetime = chrono::Duration::seconds(grant.expires_in.unwrap_or(3600));
        debug!("token refreshed");
        Ok(Some(CachedToken {
            token: AccessToken::new(grant.access_token),
            issued_at: now,
            expires_at: now + lifetime,
        }))
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn token(&self, force_refresh: bool) -> Result<Option<AccessToken>, RemoteError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(entry) = cached.as_ref() {
            let still_valid = entry.expires_at - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > now;
            let just_issued = now - entry.issued_at < chrono::Duration::seconds(REFRESH_COALESCE_SECS);
            if (still_valid && !force_refresh) || (force_refresh && just_issued) {
                return Ok(Some(entry.token.clone()));
            }
        }

        match self.refresh().await? {
            Some(entry) => {
                let token = entry.token.clone();
                *cached = Some(entry);
                Ok(Some(token))
            }
            None => {
                *cached = None;
                Ok(None)
            }
        }
    }
}

/// Fixed tokens for tests and for deployments where a credential is
/// provisioned out of band: `initial` answers plain requests, `refreshed`
/// answers forced ones.
pub struct StaticTokenProvider {
    initial: Option<AccessToken>,
    refreshed: Option<AccessToken>,
    refresh_calls: std::sync::atomic::AtomicUsize,
}

impl StaticTokenProvider {
    pub fn new(initial: Option<&str>, refreshed: Option<&str>) -> Self {
        Self {
            initial: initial.map(AccessToken::new),
            refreshed: refreshed.map(AccessToken::new),
            refresh_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, force_refresh: bool) -> Result<Option<AccessToken>, RemoteError> {
        if force_refresh {
            self.refresh_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.refreshed.clone())
        } else {
            Ok(self.initial.clone())
        }
    }
}
