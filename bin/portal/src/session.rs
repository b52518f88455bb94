//! Browser sessions.
//!
//! Every browser that signs in gets its own [`SessionContext`] and token
//! store, keyed by a random id carried in an http-only cookie. Requests only
//! ever see the entry their own cookie names.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use carebridge_api::{ApiClient, AuthInterceptor, ReauthHandler};
use carebridge_identity::{IdentityProvider, RefreshPolicy, SessionContext};
use carebridge_platform_access::RoleMapping;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default idle lifetime of a browser session.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

/// Random identifier of one browser session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(String);

impl SessionKey {
    /// Draws a new key from the operating system's random source.
    ///
    /// # Errors
    ///
    /// Returns an error if no randomness is available.
    pub fn generate() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; 32];
        getrandom::fill(&mut bytes)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keys are credentials; keep them out of logs.
impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// How per-session API clients authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCredentials {
    /// Each session sends its own bearer token.
    PerSession {
        /// End the session when the backend keeps refusing its token.
        end_on_reauth: bool,
    },
    /// Every session shares the client's fixed credentials.
    Shared,
}

/// One browser's session and the API client bound to it.
pub struct ClientSession {
    pub context: Arc<SessionContext>,
    pub api: ApiClient,
    last_seen: Mutex<Instant>,
}

impl ClientSession {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Ends a session when the backend no longer accepts its credentials.
struct EndSessionOnReauth {
    session: Arc<SessionContext>,
}

impl ReauthHandler for EndSessionOnReauth {
    fn reauthenticate(&self, cause: &str) {
        info!(%cause, "ending session; user must sign in again");
        self.session.logout();
    }
}

/// All live browser sessions.
pub struct SessionRegistry {
    provider: Arc<dyn IdentityProvider>,
    policy: RefreshPolicy,
    mapping: RoleMapping,
    init_timeout: Duration,
    api: ApiClient,
    credentials: ApiCredentials,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    ///
    /// `api` is the template each session's client is derived from.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        policy: RefreshPolicy,
        mapping: RoleMapping,
        init_timeout: Duration,
        api: ApiClient,
    ) -> Self {
        Self {
            provider,
            policy,
            mapping,
            init_timeout,
            api,
            credentials: ApiCredentials::PerSession {
                end_on_reauth: true,
            },
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Looks up a live session and marks it as used.
    ///
    /// A session idle past the timeout is dropped and not returned.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<ClientSession>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        if session.idle_for() >= self.idle_timeout {
            debug!("dropping idle browser session");
            self.remove(key);
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Starts a new, uninitialized session.
    ///
    /// # Errors
    ///
    /// Returns an error if no session key could be generated.
    pub fn create(&self) -> Result<(SessionKey, Arc<ClientSession>), getrandom::Error> {
        let key = SessionKey::generate()?;
        let session = Arc::new(self.build());
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_str().to_string(), Arc::clone(&session));
        debug!("browser session created");
        Ok((key, session))
    }

    /// Moves a session to a fresh key, invalidating the old one.
    ///
    /// Returns `None` if `old` names no session.
    ///
    /// # Errors
    ///
    /// Returns an error if no session key could be generated; the session
    /// then stays under its old key.
    pub fn rotate(&self, old: &str) -> Result<Option<SessionKey>, getrandom::Error> {
        let key = SessionKey::generate()?;
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = sessions.remove(old) else {
            return Ok(None);
        };
        sessions.insert(key.as_str().to_string(), session);
        Ok(Some(key))
    }

    /// Forgets a session.
    pub fn remove(&self, key: &str) -> Option<Arc<ClientSession>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Drops every session idle past the timeout; returns how many went.
    pub fn prune(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() < self.idle_timeout);
        before - sessions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(&self) -> ClientSession {
        let context = Arc::new(SessionContext::new(
            Arc::clone(&self.provider),
            self.policy,
            self.mapping.clone(),
            self.init_timeout,
        ));
        let api = match self.credentials {
            ApiCredentials::Shared => self.api.clone(),
            ApiCredentials::PerSession { end_on_reauth } => {
                let interceptor = AuthInterceptor::for_session(Arc::clone(&context));
                let interceptor = if end_on_reauth {
                    interceptor.with_reauth(Arc::new(EndSessionOnReauth {
                        session: Arc::clone(&context),
                    }))
                } else {
                    interceptor
                };
                self.api.with_interceptor(interceptor)
            }
        };
        ClientSession {
            context,
            api,
            last_seen: Mutex::new(Instant::now()),
        }
    }
}
