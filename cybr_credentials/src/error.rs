use std::{error, io, path::PathBuf, sync::Arc};

use cybr_clock::UnixTime;
use thiserror::Error;

use crate::{
    sources::{anonymous::ANONYMOUS_CREDENTIALS_NAME, static_provider::STATIC_CREDENTIALS_NAME},
    Credentials,
};

/// An error while attempting to retrieve credentials
///
/// Errors are cheap to clone so that a single failed refresh can be reported
/// to every caller that was waiting on it.
#[derive(Clone, Debug, Error)]
pub enum CredentialsError {
    /// The provider has no token to offer
    #[error("{source_name} credentials are empty")]
    EmptyCredentials {
        /// The name of the provider that came up empty
        source_name: String,
    },
    /// The anonymous sentinel provider was asked for credentials
    #[error("the AnonymousCredentials is not a valid credential provider, and cannot be used to sign requests")]
    AnonymousProvider,
    /// No cached SSO session exists
    #[error("no cached SSO token found at {}; log in to start a new SSO session", .path.display())]
    TokenCacheNotFound {
        /// Where the cached token was expected
        path: PathBuf,
    },
    /// The cached SSO token file could not be parsed
    #[error("cached SSO token at {} is invalid", .path.display())]
    TokenCacheInvalid {
        /// The cache file
        path: PathBuf,
        /// The parse failure
        source: Arc<serde_json::Error>,
    },
    /// The cached SSO token file exists but could not be read or written
    #[error("unable to access cached SSO token at {}", .path.display())]
    TokenCacheIo {
        /// The cache file
        path: PathBuf,
        /// The I/O failure
        source: Arc<io::Error>,
    },
    /// The cached SSO token has expired and cannot be refreshed
    #[error("cached SSO token at {} expired at {}; log in to start a new SSO session", .path.display(), .expired_at.0)]
    TokenExpired {
        /// The cache file
        path: PathBuf,
        /// When the token expired
        expired_at: UnixTime,
    },
    /// Exchanging the SSO token for credentials failed
    #[error("{provider}: unable to exchange SSO token for credentials")]
    ExchangeFailed {
        /// The provider that attempted the exchange
        provider: &'static str,
        /// The underlying failure
        source: ExchangeError,
    },
    /// Refreshing an expired SSO token failed
    #[error("{provider}: unable to refresh cached SSO token")]
    TokenRefreshFailed {
        /// The provider that attempted the refresh
        provider: &'static str,
        /// The underlying failure
        source: ExchangeError,
    },
    /// The provider was configured incorrectly
    #[error("invalid credentials provider configuration: {0}")]
    InvalidConfiguration(&'static str),
    /// An error raised by a caller-supplied provider
    #[error(transparent)]
    Provider(Arc<dyn error::Error + Send + Sync + 'static>),
}

impl CredentialsError {
    /// Wraps an arbitrary error raised by a custom provider
    pub fn custom(error: impl error::Error + Send + Sync + 'static) -> Self {
        Self::Provider(Arc::new(error))
    }

    /// The credentials value that accompanies this error, if any
    ///
    /// Only the `source` of the returned value is populated, so that logging
    /// and diagnostics can attribute the failure to a provider.
    pub fn partial_credentials(&self) -> Option<Credentials> {
        match self {
            Self::EmptyCredentials { source_name } => {
                Some(Credentials::source_only(source_name.as_str()))
            }
            Self::AnonymousProvider => Some(Credentials::source_only(ANONYMOUS_CREDENTIALS_NAME)),
            _ => None,
        }
    }

    /// Whether the end user must log in again before credentials can be
    /// obtained
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::TokenCacheNotFound { .. }
                | Self::TokenCacheInvalid { .. }
                | Self::TokenExpired { .. }
                | Self::ExchangeFailed {
                    source: ExchangeError::ExpiredToken { .. },
                    ..
                }
                | Self::TokenRefreshFailed {
                    source: ExchangeError::ExpiredToken { .. } | ExchangeError::AccessDenied { .. },
                    ..
                }
        )
    }

    pub(crate) fn empty_static() -> Self {
        Self::EmptyCredentials {
            source_name: STATIC_CREDENTIALS_NAME.to_owned(),
        }
    }
}

/// An error returned by the SSO token endpoint
#[derive(Clone, Debug, Error)]
pub enum ExchangeError {
    /// The service refused to issue credentials
    #[error("access denied: {message}")]
    AccessDenied {
        /// The message returned by the service
        message: String,
    },
    /// The access token presented has expired
    #[error("access token expired: {message}")]
    ExpiredToken {
        /// The message returned by the service
        message: String,
    },
    /// The request was rejected as malformed
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// The message returned by the service
        message: String,
    },
    /// The service is rate limiting requests
    #[error("too many requests: {message}")]
    TooManyRequests {
        /// The message returned by the service
        message: String,
    },
    /// The service responded with an unexpected status
    #[error("unexpected response from SSO service ({status}): {body}")]
    UnexpectedResponse {
        /// The HTTP status code
        status: u16,
        /// The response body
        body: String,
    },
    /// The request could not be sent or the response could not be read
    #[error("error communicating with SSO service")]
    Transport(#[source] Arc<dyn error::Error + Send + Sync + 'static>),
    /// The response body could not be deserialized
    #[error("error deserializing SSO service response")]
    ResponseBody(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for ExchangeError {
    fn from(error: serde_json::Error) -> Self {
        Self::ResponseBody(Arc::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_carry_only_a_source() {
        let err = CredentialsError::empty_static();
        let partial = err.partial_credentials().unwrap();
        assert_eq!(partial.source(), "StaticCredentials");
        assert!(!partial.has_keys());
        assert!(!partial.can_expire());
        assert_eq!(err.to_string(), "StaticCredentials credentials are empty");
    }

    #[test]
    fn cache_failures_require_login() {
        let err = CredentialsError::TokenCacheNotFound {
            path: PathBuf::from("/tmp/x.json"),
        };
        assert!(err.requires_login());
        assert!(err.partial_credentials().is_none());

        let err = CredentialsError::ExchangeFailed {
            provider: "ssocreds",
            source: ExchangeError::TooManyRequests {
                message: "slow down".into(),
            },
        };
        assert!(!err.requires_login());
    }

    #[test]
    fn rejected_refreshes_require_login() {
        let refresh_failed = |source: ExchangeError| CredentialsError::TokenRefreshFailed {
            provider: "ssocreds",
            source,
        };

        assert!(refresh_failed(ExchangeError::ExpiredToken {
            message: "refresh token expired".into(),
        })
        .requires_login());
        assert!(refresh_failed(ExchangeError::AccessDenied {
            message: "client revoked".into(),
        })
        .requires_login());
        assert!(!refresh_failed(ExchangeError::TooManyRequests {
            message: "slow down".into(),
        })
        .requires_login());
    }

    #[test]
    fn exchange_failures_expose_their_cause() {
        let err = CredentialsError::ExchangeFailed {
            provider: "ssocreds",
            source: ExchangeError::AccessDenied {
                message: "nope".into(),
            },
        };
        let cause = error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "access denied: nope");
    }
}
