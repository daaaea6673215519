//! A sentinel provider that refuses to produce credentials

use async_trait::async_trait;

use crate::{Credentials, CredentialsError, CredentialsProvider, ProviderKind};

/// Canonical source name for the anonymous sentinel
pub const ANONYMOUS_CREDENTIALS_NAME: &str = "AnonymousCredentials";

/// A sentinel provider indicating that requests should not be signed
///
/// Configuring this provider tells outer configuration not to go looking for
/// credentials elsewhere. It can never be used to actually sign a request:
/// [`retrieve`](CredentialsProvider::retrieve) always fails, so an
/// unauthenticated call is never silently signed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnonymousCredentials;

#[async_trait]
impl CredentialsProvider for AnonymousCredentials {
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        Err(CredentialsError::AnonymousProvider)
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Anonymous
    }
}
