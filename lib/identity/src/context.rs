//! Session context: the session lifecycle state machine.
//!
//! Every identity check (restoring a session from a refresh token, or
//! completing a login callback) runs under a generation number. Starting a
//! new check or logging out bumps the generation, and a check that finishes
//! under a superseded generation has its result discarded.

use carebridge_platform_access::{
    AuthInitFailure, IdTokenClaims, Identity, RoleMapping, Session, SessionState, Token,
    TokenPair,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{IdentityError, RefreshError};
use crate::policy::RefreshPolicy;
use crate::provider::{IdentityProvider, LoginRequest};
use crate::store::TokenStore;

/// Result of an identity check before it is applied.
enum Outcome {
    Established(Identity, TokenPair),
    NoSession,
}

/// Owner of the session and its lifecycle.
///
/// The context owns the signed-in identity and the [`TokenStore`] holding
/// its credentials; logout and terminal refresh failure clear both together.
pub struct SessionContext {
    provider: Arc<dyn IdentityProvider>,
    store: TokenStore,
    mapping: RoleMapping,
    init_timeout: Duration,
    state: RwLock<SessionState>,
    generation: AtomicU64,
}

impl SessionContext {
    /// Creates a context in the `Uninitialized` state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        policy: RefreshPolicy,
        mapping: RoleMapping,
        init_timeout: Duration,
    ) -> Self {
        let store = TokenStore::new(Arc::clone(&provider), policy);
        Self {
            provider,
            store,
            mapping,
            init_timeout,
            state: RwLock::new(SessionState::Uninitialized),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the token store.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the current session, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        let identity = self.state().identity().cloned()?;
        let tokens = self.store.pair()?;
        Some(Session::new(identity, tokens))
    }

    /// Prepares a login redirect.
    ///
    /// # Errors
    ///
    /// Returns the provider's configuration error.
    pub fn begin_login(&self) -> Result<LoginRequest, IdentityError> {
        self.provider.begin_login()
    }

    /// Establishes the initial state.
    ///
    /// Without a refresh token the provider has no session for us and the
    /// state becomes `Anonymous`. With one, a refresh exchange restores the
    /// session; a rejected token also means `Anonymous`.
    #[instrument(skip_all, fields(has_refresh_token = refresh_token.is_some()))]
    pub async fn initialize(&self, refresh_token: Option<String>) -> SessionState {
        let provider = Arc::clone(&self.provider);
        self.run_check(async move {
            let Some(refresh_token) = refresh_token else {
                return Ok(Outcome::NoSession);
            };
            match provider.refresh(&refresh_token).await {
                Ok(pair) => Ok(Outcome::Established(self.identify(&pair)?, pair)),
                Err(IdentityError::Rejected { reason }) => {
                    debug!(%reason, "stored refresh token no longer accepted");
                    Ok(Outcome::NoSession)
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    /// Completes an authorization-code callback.
    #[instrument(skip_all)]
    pub async fn complete_login(&self, code: &str, pkce_verifier: &str) -> SessionState {
        let provider = Arc::clone(&self.provider);
        self.run_check(async move {
            let pair = provider.exchange_code(code, pkce_verifier).await?;
            Ok(Outcome::Established(self.identify(&pair)?, pair))
        })
        .await
    }

    /// Records that an identity check could not even start.
    pub fn fail(&self, failure: AuthInitFailure) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Authenticated(_)) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        warn!(error = %failure, "session initialization failed");
        *state = SessionState::Error(failure);
    }

    /// Ends the session on user request.
    ///
    /// Clears the identity and the token store together and supersedes any
    /// identity check still in flight. Returns the ID token, if any, for use
    /// as an end-session hint.
    pub fn logout(&self) -> Option<String> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let id_token = self.store.pair().and_then(|pair| pair.id_token);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.clear();
        if matches!(*state, SessionState::Authenticated(_) | SessionState::Loading) {
            info!(from = state.label(), "session ended by logout");
            *state = SessionState::Anonymous;
        }
        id_token
    }

    /// Ends the session after a terminal refresh failure.
    pub fn end_session(&self, cause: &RefreshError) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.clear();
        if matches!(*state, SessionState::Authenticated(_)) {
            warn!(error = %cause, "session ended by refresh failure");
            *state = SessionState::Anonymous;
        }
    }

    /// Proactive refresh; a terminal failure ends the session.
    ///
    /// # Errors
    ///
    /// Propagates the store's refresh error.
    pub async fn refresh(&self, min_validity_secs: u64) -> Result<bool, RefreshError> {
        let result = self.store.refresh(min_validity_secs).await;
        self.end_if_terminal(&result);
        result
    }

    /// Refresh after the backend rejected `rejected`; a terminal failure ends
    /// the session.
    ///
    /// # Errors
    ///
    /// Propagates the store's refresh error.
    pub async fn refresh_after_rejection(
        &self,
        rejected: Option<&Token>,
    ) -> Result<bool, RefreshError> {
        let result = self.store.refresh_after_rejection(rejected).await;
        self.end_if_terminal(&result);
        result
    }

    /// Returns the provider logout URL for the given hint.
    #[must_use]
    pub fn end_session_url(&self, id_token: Option<&str>, post_logout_redirect: &str) -> Option<String> {
        self.provider.end_session_url(id_token, post_logout_redirect)
    }

    fn end_if_terminal(&self, result: &Result<bool, RefreshError>) {
        if let Err(err) = result {
            if err.is_terminal() {
                self.end_session(err);
            }
        }
    }

    fn identify(&self, pair: &TokenPair) -> Result<Identity, AuthInitFailure> {
        let id_token = pair
            .id_token
            .as_deref()
            .ok_or_else(|| AuthInitFailure::MalformedResponse {
                reason: "token response carried no id_token".to_string(),
            })?;
        let claims = IdTokenClaims::decode(id_token)?;
        let roles = self.mapping.map(&claims)?;
        Ok(Identity::from_claims(&claims, roles))
    }

    /// Enters `Loading` under a fresh generation, or returns `None` if the
    /// current state does not admit a new check.
    fn enter_loading(&self) -> Option<u64> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Authenticated(_)) {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, from = state.label(), "identity check started");
        *state = SessionState::Loading;
        Some(generation)
    }

    async fn run_check<F>(&self, check: F) -> SessionState
    where
        F: Future<Output = Result<Outcome, AuthInitFailure>>,
    {
        let Some(generation) = self.enter_loading() else {
            debug!("already signed in; identity check skipped");
            return self.state();
        };

        let outcome = match tokio::time::timeout(self.init_timeout, check).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthInitFailure::TimedOut {
                after_secs: self.init_timeout.as_secs(),
            }),
        };

        self.settle(generation, outcome)
    }

    fn settle(&self, generation: u64, outcome: Result<Outcome, AuthInitFailure>) -> SessionState {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding result of superseded identity check");
            return state.clone();
        }

        *state = match outcome {
            Ok(Outcome::Established(identity, pair)) => {
                info!(user_id = identity.user_id(), roles = ?identity.roles().roles(), "session established");
                self.store.install(pair);
                SessionState::Authenticated(identity)
            }
            Ok(Outcome::NoSession) => {
                info!("no active session");
                SessionState::Anonymous
            }
            Err(failure) => {
                warn!(error = %failure, "session initialization failed");
                SessionState::Error(failure)
            }
        };
        state.clone()
    }
}
