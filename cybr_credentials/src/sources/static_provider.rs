//! A provider of fixed credentials

use async_trait::async_trait;

use crate::{BearerToken, Credentials, CredentialsError, CredentialsProvider, ProviderKind};

/// Canonical source name for static credentials
pub const STATIC_CREDENTIALS_NAME: &str = "StaticCredentials";

/// A set of credentials which are set once and never expire
#[derive(Clone, Debug)]
pub struct StaticCredentialsProvider {
    value: Credentials,
}

impl StaticCredentialsProvider {
    /// Constructs a provider that always returns `bearer_token`
    pub fn new(bearer_token: impl Into<BearerToken>) -> Self {
        Self {
            value: Credentials::new(bearer_token),
        }
    }

    /// Constructs a provider that always returns `value`
    ///
    /// Any expiry carried by `value` is discarded; static credentials are
    /// valid for the life of the process.
    pub fn from_credentials(value: Credentials) -> Self {
        let source = value.source().to_owned();
        Self {
            value: Credentials::new(value.bearer_token().to_owned()).with_source(source),
        }
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        if !self.value.has_keys() {
            return Err(CredentialsError::empty_static());
        }

        Ok(self.value.clone().or_source(STATIC_CREDENTIALS_NAME))
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Static
    }
}
