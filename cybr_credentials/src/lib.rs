//! Credential providers for signing requests to the service
//!
//! Every request the SDK sends is signed with a bearer token obtained from a
//! [`CredentialsProvider`]. Providers range from the trivial, such as a
//! [fixed token](StaticCredentialsProvider) or the [anonymous
//! sentinel](AnonymousCredentials), to the [SSO provider](sso), which
//! exchanges a cached login token for short-lived credentials.
//!
//! Providers that talk to the network should be wrapped in a
//! [`CredentialsCache`], which serves valid credentials from memory and
//! coalesces concurrent refreshes so that a burst of requests arriving just
//! after expiry results in a single call to the underlying provider.
//!
//! ```
//! use cybr_credentials::{CredentialsCache, CredentialsProvider, StaticCredentialsProvider};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let provider = CredentialsCache::new(StaticCredentialsProvider::new("BEARER"));
//!
//! let creds = provider.retrieve().await.unwrap();
//! assert_eq!(creds.bearer_token().as_str(), "BEARER");
//! assert_eq!(creds.source(), "StaticCredentials");
//! # }
//! ```
//!
//! # Features
//!
//! * `reqwest` (default): Provides [`HttpSsoClient`][sso::HttpSsoClient], an
//!   implementation of the SSO token exchange using [reqwest].
//! * `rustls-tls` and `default-tls`: Select the TLS backend used by
//!   [reqwest].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
mod cache;
mod credentials;
mod error;
mod provider;
pub mod sources;
pub mod sso;

pub use braids::*;
pub use cache::CredentialsCache;
pub use credentials::Credentials;
pub use error::{CredentialsError, ExchangeError};
pub use provider::{
    is_credentials_provider, provider_fn, CredentialsProvider, CredentialsProviderFn,
    ProviderKind, CREDENTIALS_PROVIDER_FN_NAME,
};
pub use sources::{AnonymousCredentials, StaticCredentialsProvider};
pub use sso::{SsoCredentialsProvider, SsoOptions};
