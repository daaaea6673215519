//! Clients for the SSO token exchange endpoint

use std::sync::Arc;

use async_trait::async_trait;
use cybr_clock::{DurationSecs, UnixTime};

use super::CachedToken;
use crate::{AccessToken, AccessTokenRef, BearerToken, ExchangeError, RefreshToken};

/// Service credentials issued in exchange for an SSO access token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleCredentials {
    /// The bearer token for calling the service
    pub bearer_token: BearerToken,
    /// When the bearer token expires
    pub expiration: UnixTime,
}

/// A renewed SSO access token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRefresh {
    /// The new access token
    pub access_token: AccessToken,
    /// How long the new access token is valid for
    pub expires_in: DurationSecs,
    /// A rotated refresh token, if the service issued one
    pub refresh_token: Option<RefreshToken>,
}

/// The SSO service's token endpoint
#[async_trait]
pub trait SsoClient: Send + Sync {
    /// Exchanges an SSO access token for service credentials
    async fn get_role_credentials(
        &self,
        access_token: &AccessTokenRef,
        user_name: Option<&str>,
    ) -> Result<RoleCredentials, ExchangeError>;

    /// Renews an expired SSO access token using the refresh credentials
    /// embedded in the cached token
    async fn refresh_token(&self, token: &CachedToken) -> Result<TokenRefresh, ExchangeError>;
}

#[async_trait]
impl<T: SsoClient + ?Sized> SsoClient for Arc<T> {
    async fn get_role_credentials(
        &self,
        access_token: &AccessTokenRef,
        user_name: Option<&str>,
    ) -> Result<RoleCredentials, ExchangeError> {
        (**self).get_role_credentials(access_token, user_name).await
    }

    async fn refresh_token(&self, token: &CachedToken) -> Result<TokenRefresh, ExchangeError> {
        (**self).refresh_token(token).await
    }
}

#[cfg(feature = "reqwest")]
pub use http::HttpSsoClient;

#[cfg(feature = "reqwest")]
mod http {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde::{de::DeserializeOwned, Serialize};

    use super::{RoleCredentials, SsoClient, TokenRefresh};
    use crate::{sso::dto, sso::CachedToken, AccessTokenRef, ExchangeError};

    /// An [`SsoClient`] that talks to the SSO service over HTTP
    ///
    /// Credentials are exchanged at `{base}/federation/credentials`; tokens
    /// are refreshed at `{base}/token`.
    #[derive(Clone, Debug)]
    pub struct HttpSsoClient {
        client: reqwest::Client,
        base_url: reqwest::Url,
    }

    impl HttpSsoClient {
        /// Constructs a new client for the SSO service at `base_url`
        pub fn new(client: reqwest::Client, mut base_url: reqwest::Url) -> Self {
            if !base_url.path().ends_with('/') {
                let path = format!("{}/", base_url.path());
                base_url.set_path(&path);
            }
            Self { client, base_url }
        }

        fn endpoint(&self, path: &str) -> Result<reqwest::Url, ExchangeError> {
            self.base_url
                .join(path)
                .map_err(|e| ExchangeError::Transport(Arc::new(e)))
        }
    }

    #[async_trait]
    impl SsoClient for HttpSsoClient {
        async fn get_role_credentials(
            &self,
            access_token: &AccessTokenRef,
            user_name: Option<&str>,
        ) -> Result<RoleCredentials, ExchangeError> {
            let request = dto::RoleCredentialsRequest {
                access_token,
                user_name,
            };

            let resp: dto::RoleCredentialsResponse = post_json(
                &self.client,
                self.endpoint("federation/credentials")?,
                &request,
            )
            .await?;

            tracing::debug!(
                expiration = resp.role_credentials.expiration.0,
                "received role credentials"
            );

            Ok(RoleCredentials {
                bearer_token: resp.role_credentials.bearer_token,
                expiration: resp.role_credentials.expiration,
            })
        }

        async fn refresh_token(&self, token: &CachedToken) -> Result<TokenRefresh, ExchangeError> {
            let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
                token.client_id.as_deref(),
                token.client_secret.as_deref(),
                token.refresh_token.as_deref(),
            ) else {
                return Err(ExchangeError::InvalidRequest {
                    message: "cached token carries no refresh credentials".to_owned(),
                });
            };

            let request = dto::RefreshTokenRequest {
                grant_type: "refresh_token",
                client_id,
                client_secret,
                refresh_token,
            };

            let resp: dto::TokenResponse =
                post_json(&self.client, self.endpoint("token")?, &request).await?;

            tracing::info!(
                lifetime = resp.expires_in.0,
                has_refresh_token = resp.refresh_token.is_some(),
                "refreshed SSO access token"
            );

            Ok(TokenRefresh {
                access_token: resp.access_token,
                expires_in: resp.expires_in,
                refresh_token: resp.refresh_token,
            })
        }
    }

    /// Classifies an error response from the SSO service
    pub(super) fn classify_error(status: u16, body: &str) -> ExchangeError {
        let parsed: dto::ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code = parsed.code.unwrap_or_default();
        let message = parsed.message.unwrap_or_else(|| body.to_owned());

        let is = |name: &str| {
            code.to_ascii_lowercase()
                .replace('_', "")
                .contains(&name.to_ascii_lowercase())
        };

        let denied = status == 401 || status == 403;
        let expired_session = denied
            && is("Unauthorized")
            && message.to_ascii_lowercase().contains("expired");

        if is("ExpiredToken") || expired_session {
            ExchangeError::ExpiredToken { message }
        } else if is("AccessDenied") || denied {
            ExchangeError::AccessDenied { message }
        } else if is("TooManyRequests") || status == 429 {
            ExchangeError::TooManyRequests { message }
        } else if is("InvalidRequest") || status == 400 {
            ExchangeError::InvalidRequest { message }
        } else {
            ExchangeError::UnexpectedResponse {
                status,
                body: body.to_owned(),
            }
        }
    }

    fn transport(error: reqwest::Error) -> ExchangeError {
        ExchangeError::Transport(Arc::new(error))
    }

    #[tracing::instrument(err, skip(client, url, payload), fields(url = %url))]
    async fn post_json<S, T>(
        client: &reqwest::Client,
        url: reqwest::Url,
        payload: &S,
    ) -> Result<T, ExchangeError>
    where
        S: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::trace!("sending request to SSO service");

        let resp = client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();

        tracing::debug!(
            response.status = status.as_u16(),
            "received response from SSO service"
        );

        let body = resp.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(classify_error(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            ));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{http::classify_error, *};
    use crate::{ClientId, ClientSecret};

    #[test]
    fn classifies_by_code_before_status() {
        let err = classify_error(
            401,
            r#"{"__type":"ExpiredTokenException","message":"token expired"}"#,
        );
        assert!(matches!(
            err,
            ExchangeError::ExpiredToken { message } if message == "token expired"
        ));

        let err = classify_error(400, r#"{"error":"expired_token"}"#);
        assert!(matches!(err, ExchangeError::ExpiredToken { .. }));
    }

    #[test]
    fn unauthorized_with_an_expired_session_is_an_expired_token() {
        let err = classify_error(
            401,
            r#"{"__type":"UnauthorizedException","message":"Session token has expired"}"#,
        );
        assert!(matches!(
            err,
            ExchangeError::ExpiredToken { message } if message == "Session token has expired"
        ));

        let err = classify_error(
            403,
            r#"{"__type":"UnauthorizedException","message":"Session token not found or invalid"}"#,
        );
        assert!(matches!(err, ExchangeError::AccessDenied { .. }));

        let err = classify_error(
            400,
            r#"{"__type":"UnauthorizedException","message":"Session token has expired"}"#,
        );
        assert!(matches!(err, ExchangeError::InvalidRequest { .. }));
    }

    #[test]
    fn classifies_by_status() {
        assert!(matches!(
            classify_error(403, "forbidden"),
            ExchangeError::AccessDenied { message } if message == "forbidden"
        ));
        assert!(matches!(
            classify_error(429, ""),
            ExchangeError::TooManyRequests { .. }
        ));
        assert!(matches!(
            classify_error(400, "{}"),
            ExchangeError::InvalidRequest { .. }
        ));
        assert!(matches!(
            classify_error(503, "unavailable"),
            ExchangeError::UnexpectedResponse { status: 503, .. }
        ));
    }

    async fn client_for(server: &MockServer) -> HttpSsoClient {
        let base = reqwest::Url::parse(&format!("{}/sso", server.uri())).unwrap();
        HttpSsoClient::new(reqwest::Client::new(), base)
    }

    fn refreshable_token() -> CachedToken {
        CachedToken {
            access_token: AccessToken::from_static("old-access"),
            expires_at: UnixTime(1),
            region: "us-east-1".into(),
            start_url: "https://example.awsapps.com/start".into(),
            client_id: Some(ClientId::from_static("cid")),
            client_secret: Some(ClientSecret::from_static("secret")),
            refresh_token: Some(RefreshToken::from_static("rt")),
        }
    }

    #[tokio::test]
    async fn exchanges_access_token_for_role_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sso/federation/credentials"))
            .and(body_json(json!({ "accessToken": "access", "userName": "alice" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "roleCredentials": { "bearerToken": "bearer", "expiration": 1_800_000_000u64 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let creds = client
            .get_role_credentials(&AccessToken::from_static("access"), Some("alice"))
            .await
            .unwrap();

        assert_eq!(creds.bearer_token.as_str(), "bearer");
        assert_eq!(creds.expiration, UnixTime(1_800_000_000));
    }

    #[tokio::test]
    async fn maps_denials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sso/federation/credentials"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "not assigned" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .get_role_credentials(&AccessToken::from_static("access"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::AccessDenied { message } if message == "not assigned"
        ));
    }

    #[tokio::test]
    async fn rejects_malformed_success_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sso/federation/credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .get_role_credentials(&AccessToken::from_static("access"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::ResponseBody(_)));
    }

    #[tokio::test]
    async fn refreshes_with_embedded_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sso/token"))
            .and(body_json(json!({
                "grantType": "refresh_token",
                "clientId": "cid",
                "clientSecret": "secret",
                "refreshToken": "rt",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "new-access",
                "expiresIn": 3600,
                "refreshToken": "rt-2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let refresh = client.refresh_token(&refreshable_token()).await.unwrap();

        assert_eq!(refresh.access_token.as_str(), "new-access");
        assert_eq!(refresh.expires_in, DurationSecs(3600));
        assert_eq!(
            refresh.refresh_token.as_ref().map(|t| t.as_str()),
            Some("rt-2")
        );
    }

    #[tokio::test]
    async fn refresh_without_credentials_never_calls_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut token = refreshable_token();
        token.refresh_token = None;

        let client = client_for(&server).await;
        let err = client.refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidRequest { .. }));
    }
}
