//! Process-wide token store with serialized refresh.
//!
//! The store is the only holder of the live credentials. Writes happen in
//! three places, all inside this module: installing the pair issued at
//! sign-in, the single-flight refresh path, and clearing on logout or
//! terminal refresh failure.

use carebridge_platform_access::{Token, TokenPair};
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::error::{IdentityError, RefreshError};
use crate::policy::RefreshPolicy;
use crate::provider::IdentityProvider;

type InFlight = Shared<BoxFuture<'static, Result<bool, RefreshError>>>;

/// Holder of the current token pair.
///
/// Cloning is cheap and every clone sees the same credentials. At most one
/// refresh exchange is in flight at a time; concurrent callers await the same
/// exchange and observe the same outcome.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    policy: RefreshPolicy,
    current: RwLock<Option<TokenPair>>,
    in_flight: Mutex<Option<InFlight>>,
    /// Bumped on every install and clear so a refresh that started under an
    /// earlier session cannot write into a later one.
    epoch: AtomicU64,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, policy: RefreshPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                policy,
                current: RwLock::new(None),
                in_flight: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the refresh policy.
    #[must_use]
    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    /// Returns the current access token without side effects.
    #[must_use]
    pub fn get_token(&self) -> Option<Token> {
        self.pair().map(|pair| pair.access)
    }

    /// Returns the current access token only if it has not expired.
    #[must_use]
    pub fn valid_token(&self) -> Option<Token> {
        self.get_token()
            .filter(|token| token.is_valid_at(Utc::now()))
    }

    /// Returns the full current pair.
    #[must_use]
    pub fn pair(&self) -> Option<TokenPair> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Refreshes if the access token has less than `min_validity_secs` left.
    ///
    /// Returns whether a new token was issued. With no stored token there is
    /// nothing to refresh and the result is `Ok(false)`.
    ///
    /// # Errors
    ///
    /// `RefreshFailure` when the refresh token is rejected or missing for an
    /// expired access token; the store is cleared. `Unavailable` when the
    /// exchange did not complete; the store is left as it was.
    pub async fn refresh(&self, min_validity_secs: u64) -> Result<bool, RefreshError> {
        let policy = self.inner.policy;
        self.refresh_when(|pair| policy.needs_refresh(&pair.access, min_validity_secs, Utc::now()))
            .await
    }

    /// Refreshes after the backend rejected `rejected`.
    ///
    /// If another caller already rotated the token the newer token is used
    /// without a second exchange.
    ///
    /// # Errors
    ///
    /// Same as [`TokenStore::refresh`].
    pub async fn refresh_after_rejection(
        &self,
        rejected: Option<&Token>,
    ) -> Result<bool, RefreshError> {
        if let (Some(current), Some(rejected)) = (self.valid_token(), rejected) {
            if current != *rejected {
                debug!("token already rotated by a concurrent refresh");
                return Ok(true);
            }
        }
        self.refresh_when(|_| true).await
    }

    async fn refresh_when(
        &self,
        should_refresh: impl FnOnce(&TokenPair) -> bool,
    ) -> Result<bool, RefreshError> {
        let flight = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight token refresh");
                existing.clone()
            } else {
                let Some(pair) = self.pair() else {
                    return Ok(false);
                };
                if !should_refresh(&pair) {
                    return Ok(false);
                }
                let Some(refresh_token) = pair.refresh_token.clone() else {
                    if pair.access.is_valid_at(Utc::now()) {
                        return Ok(false);
                    }
                    self.clear();
                    return Err(RefreshError::RefreshFailure {
                        reason: "access token expired and no refresh token was issued".to_string(),
                    });
                };

                let inner = Arc::clone(&self.inner);
                let epoch = inner.epoch.load(Ordering::SeqCst);
                let flight = async move { inner.exchange(refresh_token, epoch).await }
                    .boxed()
                    .shared();
                *slot = Some(flight.clone());
                flight
            }
        };

        let result = flight.clone().await;

        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|f| f.ptr_eq(&flight)) {
            *slot = None;
        }

        result
    }

    /// Installs the pair issued at sign-in.
    pub(crate) fn install(&self, pair: TokenPair) {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *current = Some(pair);
    }

    /// Drops all credentials.
    pub(crate) fn clear(&self) {
        self.inner.clear();
    }
}

impl Inner {
    async fn exchange(self: Arc<Self>, refresh_token: String, epoch: u64) -> Result<bool, RefreshError> {
        debug!("exchanging refresh token");
        match self.provider.refresh(&refresh_token).await {
            Ok(renewed) => {
                let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
                let Some(previous) = current.as_ref() else {
                    debug!("session ended during refresh; discarding new token");
                    return Ok(false);
                };
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    debug!("session replaced during refresh; discarding new token");
                    return Ok(false);
                }
                let rotated = previous.rotated(renewed);
                info!(expires_at = %rotated.access.expires_at(), "access token refreshed");
                *current = Some(rotated);
                Ok(true)
            }
            Err(err @ IdentityError::Rejected { .. }) => {
                warn!(error = %err, "refresh token rejected; clearing credentials");
                self.clear();
                Err(err.into())
            }
            Err(err) => {
                warn!(error = %err, "token refresh did not complete");
                Err(err.into())
            }
        }
    }

    fn clear(&self) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, FakeProvider, pair_with_lifetime};
    use std::time::Duration;

    fn store_with(provider: Arc<FakeProvider>, pair: TokenPair) -> TokenStore {
        let store = TokenStore::new(provider, RefreshPolicy::new(30));
        store.install(pair);
        store
    }

    #[tokio::test]
    async fn ample_lifetime_makes_no_network_call() {
        let provider = Arc::new(FakeProvider::new(Behavior::Issue { lifetime_secs: 3600 }));
        let store = store_with(provider.clone(), pair_with_lifetime("a0", 3600));

        assert_eq!(store.refresh(60).await, Ok(false));
        assert_eq!(provider.refresh_calls(), 0);
        assert_eq!(store.get_token().expect("token").secret(), "a0");
    }

    #[tokio::test]
    async fn near_expiry_refreshes_and_replaces_token() {
        let provider = Arc::new(FakeProvider::new(Behavior::Issue { lifetime_secs: 3600 }));
        let store = store_with(provider.clone(), pair_with_lifetime("a0", 10));

        assert_eq!(store.refresh(0).await, Ok(true));
        assert_eq!(provider.refresh_calls(), 1);

        let token = store.get_token().expect("token");
        assert_eq!(token.secret(), "access-1");
        assert!(token.remaining_secs(Utc::now()) > 3000);
        assert_eq!(
            store.pair().expect("pair").refresh_token.as_deref(),
            Some("refresh-1")
        );
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_exchange() {
        let provider = Arc::new(
            FakeProvider::new(Behavior::Issue { lifetime_secs: 3600 })
                .with_delay(Duration::from_millis(50)),
        );
        let store = store_with(provider.clone(), pair_with_lifetime("a0", 5));

        let calls = (0..8).map(|_| {
            let store = store.clone();
            async move { store.refresh(30).await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(provider.refresh_calls(), 1);
        assert!(results.iter().all(|r| *r == Ok(true)));
    }

    #[tokio::test]
    async fn rejected_refresh_is_terminal_and_clears() {
        let provider = Arc::new(FakeProvider::new(Behavior::Reject));
        let store = store_with(provider.clone(), pair_with_lifetime("a0", 5));

        let err = store.refresh(30).await.unwrap_err();
        assert!(err.is_terminal());
        assert!(store.get_token().is_none());

        // Nothing left to refresh, so no second exchange.
        assert_eq!(store.refresh(30).await, Ok(false));
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn unreachable_provider_keeps_credentials() {
        let provider = Arc::new(FakeProvider::new(Behavior::Unreachable));
        let store = store_with(provider, pair_with_lifetime("a0", 5));

        let err = store.refresh(30).await.unwrap_err();
        assert!(!err.is_terminal());
        assert_eq!(store.get_token().expect("token").secret(), "a0");
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_fails() {
        let provider = Arc::new(FakeProvider::new(Behavior::Issue { lifetime_secs: 60 }));
        let mut pair = pair_with_lifetime("a0", -5);
        pair.refresh_token = None;
        let store = store_with(provider.clone(), pair);

        assert!(store.refresh(30).await.unwrap_err().is_terminal());
        assert_eq!(provider.refresh_calls(), 0);
        assert!(store.valid_token().is_none());
    }

    #[tokio::test]
    async fn empty_store_has_nothing_to_refresh() {
        let provider = Arc::new(FakeProvider::new(Behavior::Issue { lifetime_secs: 60 }));
        let store = TokenStore::new(provider.clone(), RefreshPolicy::default());
        assert_eq!(store.refresh(30).await, Ok(false));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn clear_during_refresh_discards_result() {
        let provider = Arc::new(
            FakeProvider::new(Behavior::Issue { lifetime_secs: 3600 })
                .with_delay(Duration::from_millis(50)),
        );
        let store = store_with(provider, pair_with_lifetime("a0", 5));

        let refreshing = store.refresh(30);
        let clearing = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.clear();
        };
        let (result, ()) = tokio::join!(refreshing, clearing);

        assert_eq!(result, Ok(false));
        assert!(store.get_token().is_none());
    }

    #[tokio::test]
    async fn rejection_refresh_skips_exchange_when_already_rotated() {
        let provider = Arc::new(FakeProvider::new(Behavior::Issue { lifetime_secs: 3600 }));
        let store = store_with(provider.clone(), pair_with_lifetime("a0", 3600));
        let stale = Token::with_lifetime("old", Utc::now(), 3600);

        assert_eq!(store.refresh_after_rejection(Some(&stale)).await, Ok(true));
        assert_eq!(provider.refresh_calls(), 0);

        let current = store.get_token();
        assert_eq!(store.refresh_after_rejection(current.as_ref()).await, Ok(true));
        assert_eq!(provider.refresh_calls(), 1);
    }
}
