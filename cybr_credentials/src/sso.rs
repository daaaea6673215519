//! Credentials exchanged from a cached SSO login
//!
//! An SSO login performed outside of this crate leaves an access token in
//! the [token cache](token_cache). The [`SsoCredentialsProvider`] reads that
//! token, exchanges it for service credentials at the SSO service, and keeps
//! the result in memory until it expires.
//!
//! ```no_run
//! # #[cfg(feature = "reqwest")]
//! # async fn example() -> Result<(), cybr_credentials::CredentialsError> {
//! use cybr_credentials::{
//!     sso::{HttpSsoClient, SsoCredentialsProvider, SsoOptions},
//!     CredentialsProvider,
//! };
//!
//! let client = HttpSsoClient::new(
//!     reqwest::Client::new(),
//!     reqwest::Url::parse("https://example.cyberark.cloud/sso/").unwrap(),
//! );
//!
//! let provider = SsoCredentialsProvider::new(
//!     client,
//!     SsoOptions::new().with_start_url("https://example.awsapps.com/start"),
//! )?;
//!
//! let creds = provider.retrieve().await?;
//! # Ok(()) }
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use cybr_clock::{Clock, System};
use futures::FutureExt;
use serde::Deserialize;

use crate::{
    cache::RefreshCell, Credentials, CredentialsError, CredentialsProvider, ProviderKind,
};

mod client;
#[cfg(feature = "reqwest")]
mod dto;
pub mod token_cache;

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub use client::HttpSsoClient;
pub use client::{RoleCredentials, SsoClient, TokenRefresh};
pub use token_cache::{CachedToken, TokenCache};

/// Canonical source name for credentials produced by the SSO provider
pub const PROVIDER_NAME: &str = "ssocreds";

/// Configuration for an [`SsoCredentialsProvider`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SsoOptions {
    /// The user name assigned to the user
    pub user_name: Option<String>,

    /// The URL of the organization's SSO user portal
    pub start_url: Option<String>,

    /// The file the cached token is read from
    ///
    /// When unset, the file is derived from the start URL:
    ///
    /// ```text
    /// ~/.cybr/sso/cache/<sha1-hex-encoded-start-url>.json
    /// ```
    ///
    /// When set, the start URL is ignored for locating the cache.
    pub cached_token_filepath: Option<PathBuf>,
}

impl SsoOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user name
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Sets the SSO start URL
    pub fn with_start_url(mut self, start_url: impl Into<String>) -> Self {
        self.start_url = Some(start_url.into());
        self
    }

    /// Sets an explicit cached token file
    pub fn with_cached_token_filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.cached_token_filepath = Some(path.into());
        self
    }
}

/// Loads the cached login token and exchanges it for credentials
///
/// Shared with in-flight refreshes, which outlive any single caller.
struct Exchange<C> {
    client: Arc<dyn SsoClient>,
    token_cache: TokenCache,
    user_name: Option<String>,
    clock: C,
}

impl<C: Clock> Exchange<C> {
    async fn fetch(&self) -> Result<Credentials, CredentialsError> {
        let token = self.token_cache.load().await?;
        let token = self.ensure_fresh(token).await?;

        let role = self
            .client
            .get_role_credentials(&token.access_token, self.user_name.as_deref())
            .await
            .map_err(|source| CredentialsError::ExchangeFailed {
                provider: PROVIDER_NAME,
                source,
            })?;

        tracing::info!(
            expires = role.expiration.0,
            "received new credentials from SSO service"
        );

        Ok(Credentials::new(role.bearer_token)
            .with_source(PROVIDER_NAME)
            .expiring_at(role.expiration))
    }

    async fn ensure_fresh(&self, token: CachedToken) -> Result<CachedToken, CredentialsError> {
        let now = self.clock.now();
        if !token.is_expired_at(now) {
            return Ok(token);
        }

        if !token.can_refresh() {
            return Err(CredentialsError::TokenExpired {
                path: self.token_cache.path().to_owned(),
                expired_at: token.expires_at,
            });
        }

        tracing::debug!(
            expired_at = token.expires_at.0,
            "cached SSO token expired, refreshing"
        );

        let refresh = self.client.refresh_token(&token).await.map_err(|source| {
            CredentialsError::TokenRefreshFailed {
                provider: PROVIDER_NAME,
                source,
            }
        })?;

        let token = token.refreshed(refresh, now);
        if let Err(error) = self.token_cache.store(&token).await {
            tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "unable to persist refreshed SSO token"
            );
        }

        Ok(token)
    }
}

/// A credentials provider backed by an SSO login
///
/// Valid credentials are served from memory without any I/O. When they are
/// missing or expired, the cached login token is loaded and exchanged for
/// new credentials; concurrent callers share a single exchange. A failed
/// exchange leaves the provider as it was, so the next call tries again.
pub struct SsoCredentialsProvider<C = System> {
    cell: RefreshCell<C>,
    exchange: Arc<Exchange<C>>,
}

impl SsoCredentialsProvider<System> {
    /// Constructs a new SSO provider
    ///
    /// Fails if neither a start URL nor an explicit cached token file is
    /// configured.
    pub fn new(
        client: impl SsoClient + 'static,
        options: SsoOptions,
    ) -> Result<Self, CredentialsError> {
        let token_cache = TokenCache::from_options(&options)?;
        Ok(Self {
            cell: RefreshCell::new(System),
            exchange: Arc::new(Exchange {
                client: Arc::new(client),
                token_cache,
                user_name: options.user_name,
                clock: System,
            }),
        })
    }
}

impl<C: Clock> SsoCredentialsProvider<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D: Clock + Clone>(self, clock: D) -> SsoCredentialsProvider<D> {
        let exchange = Arc::new(Exchange {
            client: Arc::clone(&self.exchange.client),
            token_cache: self.exchange.token_cache.clone(),
            user_name: self.exchange.user_name.clone(),
            clock: clock.clone(),
        });
        SsoCredentialsProvider {
            cell: self.cell.with_clock(clock),
            exchange,
        }
    }

    /// The file the cached login token is read from
    pub fn cached_token_filepath(&self) -> &Path {
        self.exchange.token_cache.path()
    }
}

impl<C: fmt::Debug> fmt::Debug for SsoCredentialsProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SsoCredentialsProvider")
            .field("token_cache", &self.exchange.token_cache)
            .field("user_name", &self.exchange.user_name)
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> CredentialsProvider for SsoCredentialsProvider<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        let exchange = Arc::clone(&self.exchange);
        self.cell
            .get_or_refresh(move || async move { exchange.fetch().await }.boxed())
            .await
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Sso
    }
}
