use cybr_clock::{Clock, System, UnixTime};

use crate::{BearerToken, BearerTokenRef};

/// A bearer credential as handed to request-signing code
///
/// Values are immutable. Providers produce a new value on every refresh
/// rather than updating one in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    bearer_token: BearerToken,
    source: String,
    can_expire: bool,
    expires: UnixTime,
}

impl Credentials {
    /// Constructs non-expiring credentials around a bearer token
    pub fn new(bearer_token: impl Into<BearerToken>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            source: String::new(),
            can_expire: false,
            expires: UnixTime::default(),
        }
    }

    /// Constructs credentials that carry only a source, used to attribute
    /// a failure to the provider that produced it
    pub(crate) fn source_only(source: impl Into<String>) -> Self {
        Self::new(BearerToken::from_static("")).with_source(source)
    }

    /// Sets the name of the source that produced these credentials
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Marks the credentials as expiring at `expires`
    pub fn expiring_at(mut self, expires: UnixTime) -> Self {
        self.can_expire = true;
        self.expires = expires;
        self
    }

    /// Fills in the source if it has not been set
    pub(crate) fn or_source(self, source: &str) -> Self {
        if self.source.is_empty() {
            self.with_source(source)
        } else {
            self
        }
    }

    /// Gets the bearer token
    #[inline]
    pub fn bearer_token(&self) -> &BearerTokenRef {
        &self.bearer_token
    }

    /// Gets the name of the source that produced these credentials
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether these credentials can expire at all
    #[inline]
    pub fn can_expire(&self) -> bool {
        self.can_expire
    }

    /// Gets the expiry time
    ///
    /// Meaningless when [`can_expire`](Self::can_expire) is `false`.
    #[inline]
    pub fn expires(&self) -> UnixTime {
        self.expires
    }

    /// Whether a bearer token is present
    #[inline]
    pub fn has_keys(&self) -> bool {
        !self.bearer_token.as_str().is_empty()
    }

    /// Whether the credentials have expired according to the system clock
    #[inline]
    pub fn expired(&self) -> bool {
        self.expired_with_clock(&System)
    }

    /// Whether the credentials have expired according to `clock`
    #[inline]
    pub fn expired_with_clock<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.expired_at(clock.now())
    }

    /// Whether the credentials would be expired at `now`
    ///
    /// Credentials that cannot expire are never expired. Otherwise they are
    /// expired unless `now` is strictly before the expiry time.
    #[inline]
    pub fn expired_at(&self, now: UnixTime) -> bool {
        self.can_expire && now >= self.expires
    }
}
