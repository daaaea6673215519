//! Caching of credentials with coalesced refreshes

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use cybr_clock::{Clock, DurationSecs, System};
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{Credentials, CredentialsError, CredentialsProvider, ProviderKind};

type Flight = Shared<BoxFuture<'static, Result<Credentials, CredentialsError>>>;

/// Holds the current credentials and at most one refresh in flight
///
/// Reads of valid credentials never take a lock. The first caller to find the
/// credentials missing or expired starts a refresh; every caller arriving
/// while it runs awaits the same refresh and observes the same result.
///
/// The refresh is not owned by any one caller. If a waiter is dropped, the
/// remaining waiters continue to drive it; if all of them are dropped, the
/// next caller picks it up where it left off. A finished refresh leaves the
/// slot itself, so no caller can join a flight that has already resolved.
pub(crate) struct RefreshCell<C> {
    current: Arc<ArcSwapOption<Credentials>>,
    in_flight: Arc<Mutex<Option<Flight>>>,
    expiry_window: DurationSecs,
    clock: C,
}

impl<C: Clock> RefreshCell<C> {
    pub(crate) fn new(clock: C) -> Self {
        Self {
            current: Arc::new(ArcSwapOption::empty()),
            in_flight: Arc::new(Mutex::new(None)),
            expiry_window: DurationSecs(0),
            clock,
        }
    }

    pub(crate) fn with_expiry_window(mut self, expiry_window: DurationSecs) -> Self {
        self.expiry_window = expiry_window;
        self
    }

    pub(crate) fn with_clock<D: Clock>(self, clock: D) -> RefreshCell<D> {
        RefreshCell {
            current: self.current,
            in_flight: self.in_flight,
            expiry_window: self.expiry_window,
            clock,
        }
    }

    /// The current credentials, if present and not yet expired
    pub(crate) fn valid(&self) -> Option<Credentials> {
        let current = self.current.load_full()?;
        let now = self.clock.now() + self.expiry_window;
        if current.expired_at(now) {
            tracing::trace!(
                expires = current.expires().0,
                now = now.0,
                "cached credentials expired"
            );
            None
        } else {
            Some((*current).clone())
        }
    }

    /// Drops the current credentials so that the next retrieval refreshes
    pub(crate) fn clear(&self) {
        self.current.store(None);
    }

    /// Returns the current credentials, refreshing them if needed
    ///
    /// `refresh` is only invoked if no refresh is already in flight.
    pub(crate) async fn get_or_refresh<F>(
        &self,
        refresh: F,
    ) -> Result<Credentials, CredentialsError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<Credentials, CredentialsError>>,
    {
        if let Some(creds) = self.valid() {
            tracing::trace!("using cached credentials");
            return Ok(creds);
        }

        let flight = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            // A refresh may have completed while we waited for the lock
            if let Some(creds) = self.valid() {
                return Ok(creds);
            }

            match &*in_flight {
                Some(flight) => {
                    tracing::debug!("joining credentials refresh already in flight");
                    flight.clone()
                }
                None => {
                    tracing::debug!("credentials missing or expired, starting refresh");
                    let flight = publish(
                        Arc::clone(&self.current),
                        Arc::downgrade(&self.in_flight),
                        refresh(),
                    );
                    *in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }
}

/// Wraps `refresh` so that its outcome is published under the slot lock
///
/// Callers holding the lock see either the old credentials with the flight
/// still pending, or the new credentials with the slot empty.
fn publish(
    current: Arc<ArcSwapOption<Credentials>>,
    in_flight: Weak<Mutex<Option<Flight>>>,
    refresh: BoxFuture<'static, Result<Credentials, CredentialsError>>,
) -> Flight {
    async move {
        let result = refresh.await;

        // The slot holds this flight, so it only refers back weakly
        let in_flight = in_flight.upgrade();
        let mut slot = in_flight
            .as_deref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner));
        if let Ok(creds) = &result {
            current.store(Some(Arc::new(creds.clone())));
        }
        if let Some(slot) = &mut slot {
            **slot = None;
        }

        result
    }
    .boxed()
    .shared()
}

impl<C: fmt::Debug> fmt::Debug for RefreshCell<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RefreshCell")
            .field("current", &self.current.load_full())
            .field("expiry_window", &self.expiry_window)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// A provider decorator that caches credentials until they expire
///
/// Concurrent retrievals while the cached value is missing or expired result
/// in a single call to the wrapped provider. Identity queries are forwarded
/// to the wrapped provider.
pub struct CredentialsCache<P: ?Sized, C = System> {
    cell: RefreshCell<C>,
    provider: Arc<P>,
}

impl<P: CredentialsProvider + 'static> CredentialsCache<P, System> {
    /// Wraps `provider` in a cache
    pub fn new(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }
}

impl<P: CredentialsProvider + ?Sized + 'static> CredentialsCache<P, System> {
    /// Wraps a shared `provider` in a cache
    pub fn from_arc(provider: Arc<P>) -> Self {
        Self {
            cell: RefreshCell::new(System),
            provider,
        }
    }
}

impl<P: ?Sized, C: Clock> CredentialsCache<P, C> {
    /// Treats credentials as expired `expiry_window` before they actually
    /// expire
    ///
    /// Gives callers a margin to use the credentials before the remote
    /// service would reject them.
    pub fn with_expiry_window(mut self, expiry_window: DurationSecs) -> Self {
        self.cell = self.cell.with_expiry_window(expiry_window);
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D: Clock>(self, clock: D) -> CredentialsCache<P, D> {
        CredentialsCache {
            cell: self.cell.with_clock(clock),
            provider: self.provider,
        }
    }

    /// Discards the cached credentials
    pub fn invalidate(&self) {
        self.cell.clear();
    }

    /// The wrapped provider
    pub fn inner(&self) -> &P {
        &self.provider
    }
}

impl<P: ?Sized, C: fmt::Debug> fmt::Debug for CredentialsCache<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialsCache")
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<P, C> CredentialsProvider for CredentialsCache<P, C>
where
    P: CredentialsProvider + ?Sized + 'static,
    C: Clock + Send + Sync,
{
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        let provider = Arc::clone(&self.provider);
        self.cell
            .get_or_refresh(move || {
                async move {
                    let name = provider.provider_kind().canonical_name();
                    let creds = provider.retrieve().await?;
                    Ok(creds.or_source(name))
                }
                .boxed()
            })
            .await
    }

    fn provider_kind(&self) -> ProviderKind {
        self.provider.provider_kind()
    }

    fn is_credentials_provider(&self, target: &dyn CredentialsProvider) -> bool {
        self.provider.is_credentials_provider(target)
    }
}
