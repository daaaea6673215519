//! Simple credential sources

pub mod anonymous;
pub mod static_provider;

pub use anonymous::AnonymousCredentials;
pub use static_provider::StaticCredentialsProvider;
