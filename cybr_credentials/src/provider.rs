//! The credentials provider contract and provider identity

use std::{any, fmt, future::Future, sync::Arc};

use async_trait::async_trait;

use crate::{
    sources::{
        anonymous::ANONYMOUS_CREDENTIALS_NAME, static_provider::STATIC_CREDENTIALS_NAME,
    },
    sso::PROVIDER_NAME as SSO_PROVIDER_NAME,
    Credentials, CredentialsError,
};

/// Canonical source name for credentials produced by a [`CredentialsProviderFn`]
pub const CREDENTIALS_PROVIDER_FN_NAME: &str = "CredentialsProviderFn";

/// The declared identity of a credentials provider
///
/// Decorating providers report the identity of the provider they wrap, so
/// that asking "is this ultimately an SSO provider?" sees through any number
/// of caching or logging layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// A fixed bearer token
    Static,
    /// Credentials exchanged from a cached SSO login
    Sso,
    /// The sentinel provider that refuses to sign
    Anonymous,
    /// A closure adapted with [`provider_fn`]
    Function,
    /// Any other provider, identified by its type name
    Custom(&'static str),
}

impl ProviderKind {
    /// The canonical source name for credentials from this kind of provider
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Static => STATIC_CREDENTIALS_NAME,
            Self::Sso => SSO_PROVIDER_NAME,
            Self::Anonymous => ANONYMOUS_CREDENTIALS_NAME,
            Self::Function => CREDENTIALS_PROVIDER_FN_NAME,
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A source of credentials
///
/// Every implementation must be safe to call concurrently; request signing
/// calls [`retrieve`](Self::retrieve) once per outgoing request. A provider
/// manages its own notion of expiry.
///
/// Dropping the future returned by `retrieve` abandons that caller's wait.
/// Providers that share in-flight work between callers keep that work alive
/// for the callers that are still waiting.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Retrieves credentials, or an error if none are obtainable
    ///
    /// On success the returned credentials always name their source.
    async fn retrieve(&self) -> Result<Credentials, CredentialsError>;

    /// The declared identity of this provider
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Custom(any::type_name::<Self>())
    }

    /// Whether `target` is the same kind of provider as this one
    ///
    /// Wrapping providers should forward this to the provider they wrap.
    fn is_credentials_provider(&self, target: &dyn CredentialsProvider) -> bool {
        self.provider_kind() == target.provider_kind()
    }
}

/// Whether `provider` is the same kind of credentials provider as `target`
///
/// Two absent providers are equal; an absent provider never equals a present
/// one. Otherwise the comparison is delegated to
/// [`CredentialsProvider::is_credentials_provider`], which decorators forward
/// to the provider they wrap. A provider compares equal whether it is held
/// directly or behind a reference, `Box`, or `Arc`.
pub fn is_credentials_provider(
    provider: Option<&dyn CredentialsProvider>,
    target: Option<&dyn CredentialsProvider>,
) -> bool {
    match (provider, target) {
        (None, None) => true,
        (Some(provider), Some(target)) => provider.is_credentials_provider(target),
        _ => false,
    }
}

macro_rules! forward_provider {
    ($($ptr:ty),+ $(,)?) => {$(
        #[async_trait]
        impl<P: CredentialsProvider + ?Sized> CredentialsProvider for $ptr {
            #[inline]
            async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
                (**self).retrieve().await
            }

            #[inline]
            fn provider_kind(&self) -> ProviderKind {
                (**self).provider_kind()
            }

            #[inline]
            fn is_credentials_provider(&self, target: &dyn CredentialsProvider) -> bool {
                (**self).is_credentials_provider(target)
            }
        }
    )+};
}

forward_provider!(&P, Box<P>, Arc<P>);

/// Adapts a closure into a [`CredentialsProvider`]
///
/// Constructed with [`provider_fn`].
pub struct CredentialsProviderFn<F> {
    f: F,
}

impl<F> fmt::Debug for CredentialsProviderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialsProviderFn").finish_non_exhaustive()
    }
}

/// Wraps a function returning a credentials future as a provider
///
/// ```
/// use cybr_credentials::{provider_fn, Credentials, CredentialsProvider};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let provider = provider_fn(|| async { Ok(Credentials::new("token")) });
/// let creds = provider.retrieve().await.unwrap();
/// assert_eq!(creds.source(), "CredentialsProviderFn");
/// # }
/// ```
pub fn provider_fn<F, Fut>(f: F) -> CredentialsProviderFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, CredentialsError>> + Send,
{
    CredentialsProviderFn { f }
}

#[async_trait]
impl<F, Fut> CredentialsProvider for CredentialsProviderFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, CredentialsError>> + Send,
{
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        let creds = (self.f)().await?;
        Ok(creds.or_source(CREDENTIALS_PROVIDER_FN_NAME))
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Function
    }
}
