//! DTOs for interacting with the SSO service

use cybr_clock::{DurationSecs, UnixTime};
use serde::{Deserialize, Serialize};

use crate::{
    AccessToken, AccessTokenRef, BearerToken, ClientIdRef, ClientSecretRef, RefreshToken,
    RefreshTokenRef,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RoleCredentialsRequest<'a> {
    pub access_token: &'a AccessTokenRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RoleCredentialsResponse {
    pub role_credentials: RoleCredentialsBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RoleCredentialsBody {
    pub bearer_token: BearerToken,
    pub expiration: UnixTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RefreshTokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a ClientIdRef,
    pub client_secret: &'a ClientSecretRef,
    pub refresh_token: &'a RefreshTokenRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TokenResponse {
    pub access_token: AccessToken,
    pub expires_in: DurationSecs,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
}

/// Error bodies vary by endpoint; accept the common spellings
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default, alias = "__type", alias = "error", alias = "Code")]
    pub code: Option<String>,
    #[serde(default, alias = "Message", alias = "error_description")]
    pub message: Option<String>,
}
