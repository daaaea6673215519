//! The on-disk cache of SSO login tokens
//!
//! A login flow outside of this crate writes the token obtained from the SSO
//! service to a JSON file. The file lives under `~/.cybr/sso/cache/`, named
//! after the SHA-1 digest of the SSO start URL, unless an explicit path is
//! configured.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use cybr_clock::UnixTime;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::{fs, io::AsyncWriteExt};

use super::{SsoOptions, TokenRefresh};
use crate::{AccessToken, ClientId, ClientSecret, CredentialsError, RefreshToken};

const CACHE_ROOT: &str = ".cybr";

/// A login token persisted by the SSO login flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedToken {
    /// The SSO access token
    pub access_token: AccessToken,
    /// When the access token expires
    #[serde(with = "timestamp")]
    pub expires_at: UnixTime,
    /// The region of the SSO service
    #[serde(default)]
    pub region: String,
    /// The SSO start URL the token was issued for
    #[serde(default)]
    pub start_url: String,
    /// The registered client ID, used when refreshing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// The registered client secret, used when refreshing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<ClientSecret>,
    /// The refresh token, used when refreshing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

impl CachedToken {
    /// Whether the access token would be expired at `now`
    #[inline]
    pub fn is_expired_at(&self, now: UnixTime) -> bool {
        now >= self.expires_at
    }

    /// Whether the token carries what is needed to refresh it
    pub fn can_refresh(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.refresh_token.is_some()
    }

    /// Applies a refresh obtained at `now` to this token
    pub fn refreshed(self, refresh: TokenRefresh, now: UnixTime) -> Self {
        Self {
            access_token: refresh.access_token,
            expires_at: now + refresh.expires_in,
            refresh_token: refresh.refresh_token.or(self.refresh_token),
            ..self
        }
    }
}

/// The file name of the cache entry for `start_url`
///
/// This is the lowercase hex SHA-1 digest of the start URL exactly as
/// given, with a `.json` extension.
pub fn cache_file_name(start_url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(start_url.as_bytes());
    format!("{}.json", hex::encode(hasher.finalize()))
}

/// The default directory holding cached SSO tokens, `~/.cybr/sso/cache`
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CACHE_ROOT).join("sso").join("cache"))
}

/// A cached SSO token file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Uses the token file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses the token file for `start_url` within `dir`
    pub fn for_start_url(dir: impl AsRef<Path>, start_url: &str) -> Self {
        Self::new(dir.as_ref().join(cache_file_name(start_url)))
    }

    /// Locates the token file for the given options
    ///
    /// An explicit `cached_token_filepath` is used verbatim, and the start URL
    /// is not consulted at all. Otherwise the file is derived from the start
    /// URL within [`default_cache_dir`].
    pub fn from_options(options: &SsoOptions) -> Result<Self, CredentialsError> {
        if let Some(path) = &options.cached_token_filepath {
            return Ok(Self::new(path.clone()));
        }

        let start_url = options
            .start_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(CredentialsError::InvalidConfiguration(
                "either a start URL or a cached token filepath is required",
            ))?;

        let dir = default_cache_dir().ok_or(CredentialsError::InvalidConfiguration(
            "unable to locate the home directory for the SSO token cache",
        ))?;

        Ok(Self::for_start_url(dir, start_url))
    }

    /// The location of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the cached token
    pub async fn load(&self) -> Result<CachedToken, CredentialsError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no cached SSO token");
                return Err(CredentialsError::TokenCacheNotFound {
                    path: self.path.clone(),
                });
            }
            Err(error) => return Err(self.io_error(error)),
        };

        let token: CachedToken = serde_json::from_slice(&data).map_err(|e| self.invalid(e))?;
        if token.access_token.as_str().is_empty() {
            return Err(self.invalid(<serde_json::Error as serde::de::Error>::custom(
                "accessToken must not be empty",
            )));
        }

        tracing::debug!(
            path = %self.path.display(),
            expires_at = token.expires_at.0,
            can_refresh = token.can_refresh(),
            "loaded cached SSO token"
        );

        Ok(token)
    }

    /// Atomically replaces the cached token
    ///
    /// The token is written to a temporary file in the same directory, which
    /// is then renamed over the cache file. Readers observe either the old
    /// token or the new one, never a partial write.
    pub async fn store(&self, token: &CachedToken) -> Result<(), CredentialsError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let data = serde_json::to_vec_pretty(token).map_err(|e| self.invalid(e))?;
        let tmp = self.temp_path();

        if let Err(error) = write_file(&tmp, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(self.io_error(error));
        }

        if let Err(error) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(self.io_error(error));
        }

        tracing::debug!(
            path = %self.path.display(),
            expires_at = token.expires_at.0,
            "persisted SSO token to cache"
        );

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
    }

    fn io_error(&self, error: io::Error) -> CredentialsError {
        CredentialsError::TokenCacheIo {
            path: self.path.clone(),
            source: Arc::new(error),
        }
    }

    fn invalid(&self, error: serde_json::Error) -> CredentialsError {
        tracing::warn!(
            path = %self.path.display(),
            error = (&error as &dyn std::error::Error),
            "cached SSO token is invalid"
        );
        CredentialsError::TokenCacheInvalid {
            path: self.path.clone(),
            source: Arc::new(error),
        }
    }
}

async fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file_opts = fs::OpenOptions::new();

    file_opts.create(true).truncate(true).write(true);

    #[cfg(unix)]
    file_opts.mode(0o600);

    let mut file = file_opts.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// `expiresAt` is written as RFC 3339 in UTC
///
/// Reading also accepts the `2006-01-02T15:04:05UTC` form written by some
/// login tools.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use cybr_clock::UnixTime;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &UnixTime, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = i64::try_from(time.0).map_err(<S::Error as ser::Error>::custom)?;
        let dt = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| <S::Error as ser::Error>::custom("timestamp out of range"))?;
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UnixTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        let secs = match DateTime::parse_from_rfc3339(&s) {
            Ok(dt) => dt.timestamp(),
            Err(_) => NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%SUTC")
                .map_err(|e| {
                    <D::Error as de::Error>::custom(format!("invalid expiresAt `{s}`: {e}"))
                })?
                .and_utc()
                .timestamp(),
        };
        u64::try_from(secs)
            .map(UnixTime)
            .map_err(|_| de::Error::custom("expiresAt is before the Unix epoch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_URL: &str = "https://example.awsapps.com/start";

    fn sample_token() -> CachedToken {
        CachedToken {
            access_token: AccessToken::from_static("access-token"),
            expires_at: UnixTime(1_792_411_200),
            region: "us-east-1".into(),
            start_url: START_URL.into(),
            client_id: Some(ClientId::from_static("client-id")),
            client_secret: Some(ClientSecret::from_static("client-secret")),
            refresh_token: Some(RefreshToken::from_static("refresh-token")),
        }
    }

    #[test]
    fn file_name_is_the_sha1_of_the_start_url() {
        assert_eq!(
            cache_file_name(START_URL),
            "e8be5486177c5b5392bd9aa76563515b29358e6e.json"
        );
    }

    #[test]
    fn derived_path_lives_in_the_cache_dir() {
        let cache = TokenCache::for_start_url("/cache", START_URL);
        assert_eq!(
            cache.path(),
            Path::new("/cache/e8be5486177c5b5392bd9aa76563515b29358e6e.json")
        );
    }

    #[test]
    fn explicit_path_wins_over_start_url() {
        let options = SsoOptions::new()
            .with_start_url(START_URL)
            .with_cached_token_filepath("/somewhere/else/token.json");

        let cache = TokenCache::from_options(&options).unwrap();
        assert_eq!(cache.path(), Path::new("/somewhere/else/token.json"));
    }

    #[test]
    fn start_url_or_path_is_required() {
        let err = TokenCache::from_options(&SsoOptions::new()).unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidConfiguration(_)));

        let err = TokenCache::from_options(&SsoOptions::new().with_start_url("")).unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidConfiguration(_)));
    }

    #[test]
    fn reads_the_documented_layout() {
        let token: CachedToken = serde_json::from_str(
            r#"{
                "accessToken": "abc",
                "expiresAt": "2026-10-19T12:00:00Z",
                "region": "us-east-1",
                "startUrl": "https://example.awsapps.com/start"
            }"#,
        )
        .unwrap();

        assert_eq!(token.access_token.as_str(), "abc");
        assert_eq!(token.expires_at, UnixTime(1_792_411_200));
        assert!(!token.can_refresh());
    }

    #[test]
    fn reads_offsets_fractions_and_utc_suffixes() {
        for expires_at in [
            "2026-10-19T14:00:00+02:00",
            "2026-10-19T12:00:00.750Z",
            "2026-10-19T12:00:00UTC",
        ] {
            let json = format!(r#"{{"accessToken":"abc","expiresAt":"{expires_at}"}}"#);
            let token: CachedToken = serde_json::from_str(&json).unwrap();
            assert_eq!(token.expires_at, UnixTime(1_792_411_200), "{expires_at}");
        }
    }

    #[test]
    fn writes_rfc3339() {
        let json = serde_json::to_value(sample_token()).unwrap();
        assert_eq!(json["expiresAt"], "2026-10-19T12:00:00Z");
        assert_eq!(json["startUrl"], START_URL);
    }

    #[test]
    fn refresh_replaces_token_and_expiry() {
        let token = sample_token().refreshed(
            TokenRefresh {
                access_token: AccessToken::from_static("new-access"),
                expires_in: cybr_clock::DurationSecs(3_600),
                refresh_token: None,
            },
            UnixTime(2_000_000_000),
        );

        assert_eq!(token.access_token.as_str(), "new-access");
        assert_eq!(token.expires_at, UnixTime(2_000_003_600));
        assert_eq!(
            token.refresh_token.as_ref().map(|t| t.as_str()),
            Some("refresh-token")
        );
        assert_eq!(token.region, "us-east-1");
    }

    mod when_loading {
        use super::*;

        #[tokio::test]
        async fn missing_file_is_not_found() {
            let dir = tempfile::tempdir().unwrap();
            let cache = TokenCache::for_start_url(dir.path(), START_URL);

            let err = cache.load().await.unwrap_err();
            assert!(matches!(err, CredentialsError::TokenCacheNotFound { .. }));
            assert!(err.requires_login());
        }

        #[tokio::test]
        async fn garbage_is_invalid() {
            let dir = tempfile::tempdir().unwrap();
            let cache = TokenCache::new(dir.path().join("token.json"));
            std::fs::write(cache.path(), "{not json").unwrap();

            let err = cache.load().await.unwrap_err();
            assert!(matches!(err, CredentialsError::TokenCacheInvalid { .. }));
        }

        #[tokio::test]
        async fn missing_required_fields_are_invalid() {
            let dir = tempfile::tempdir().unwrap();
            let cache = TokenCache::new(dir.path().join("token.json"));
            std::fs::write(cache.path(), r#"{"accessToken":"abc"}"#).unwrap();

            let err = cache.load().await.unwrap_err();
            assert!(matches!(err, CredentialsError::TokenCacheInvalid { .. }));
        }

        #[tokio::test]
        async fn empty_access_token_is_invalid() {
            let dir = tempfile::tempdir().unwrap();
            let cache = TokenCache::new(dir.path().join("token.json"));
            std::fs::write(
                cache.path(),
                r#"{"accessToken":"","expiresAt":"2026-10-19T12:00:00Z"}"#,
            )
            .unwrap();

            let err = cache.load().await.unwrap_err();
            assert!(matches!(err, CredentialsError::TokenCacheInvalid { .. }));
        }
    }

    mod when_storing {
        use super::*;

        #[tokio::test]
        async fn round_trips_every_field() {
            let dir = tempfile::tempdir().unwrap();
            let cache_dir = dir.path().join("sso").join("cache");
            let cache = TokenCache::for_start_url(cache_dir, START_URL);
            let token = sample_token();

            cache.store(&token).await.unwrap();
            assert_eq!(cache.load().await.unwrap(), token);
        }

        #[tokio::test]
        async fn replaces_the_previous_token_without_leftovers() {
            let dir = tempfile::tempdir().unwrap();
            let cache = TokenCache::new(dir.path().join("token.json"));

            cache.store(&sample_token()).await.unwrap();
            let mut newer = sample_token();
            newer.access_token = AccessToken::from_static("newer");
            cache.store(&newer).await.unwrap();

            assert_eq!(cache.load().await.unwrap(), newer);

            let entries: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name())
                .collect();
            assert_eq!(entries, vec![std::ffi::OsString::from("token.json")]);
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn is_private_to_the_owner() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let cache = TokenCache::new(dir.path().join("token.json"));
            cache.store(&sample_token()).await.unwrap();

            let mode = std::fs::metadata(cache.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
