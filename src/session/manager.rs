use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use url::Url;

use super::error::{AuthError, RequestError};
use super::refresh::{RefreshCycle, RefreshPhase};
use super::traits::IdentityEndpoint;
use crate::error::Error;
use crate::settings::DEFAULT_TIMEOUT;
use crate::token_store::{KeyValueStorage, TokenStore};
use crate::types::{AccessToken, NewAccount, Principal, TokenPair};

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing is known yet; the state at process start.
    Unknown,
    /// A validation or login round trip is in flight.
    Authenticating,
    /// The principal was confirmed by the identity endpoint since start.
    Authenticated(Principal),
    Anonymous,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(p) => Some(p),
            _ => None,
        }
    }
}

/// Owns the authentication state machine and the live token pair.
pub struct SessionManager<I, B> {
    identity: I,
    store: TokenStore<B>,
    reset_url: Option<Url>,
    timeout: Duration,
    state: watch::Sender<SessionState>,
    tokens: Mutex<Option<TokenPair>>,
    epoch: AtomicU64,
    validation_started: AtomicBool,
}

impl<I: IdentityEndpoint, B: KeyValueStorage> SessionManager<I, B> {
    #[must_use]
    pub fn new(identity: I, store: TokenStore<B>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            identity,
            store,
            reset_url: None,
            timeout: DEFAULT_TIMEOUT,
            state,
            tokens: Mutex::new(None),
            epoch: AtomicU64::new(0),
            validation_started: AtomicBool::new(false),
        }
    }

    /// Link target forwarded with password-reset requests.
    #[must_use]
    pub fn with_reset_url(mut self, url: Url) -> Self {
        self.reset_url = Some(url);
        self
    }

    /// Bound every identity round trip (default 10s). An elapsed bound
    /// counts as a network failure.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Counter bumped every time a session ends (logout or forced demotion).
    ///
    /// Async work started under one epoch must not apply its result under
    /// another. That includes this manager's own validation and login.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn token_store(&self) -> &TokenStore<B> {
        &self.store
    }

    #[must_use]
    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Resolve the principal behind the stored credential, if any.
    ///
    /// Runs at most once per manager: later calls return the current state
    /// without touching the network. Every failure ends in `Anonymous` and
    /// is swallowed; a missing or expired token is the normal first-run
    /// state, not an error. The stored credential is only discarded when
    /// the backend refused it, so an outage does not sign the user out for
    /// good. A logout that lands while the check is in flight wins.
    pub async fn validate_existing_session(&self) -> SessionState {
        if self.validation_started.swap(true, Ordering::SeqCst) {
            return self.state();
        }

        let epoch = self.epoch();
        self.state.send_replace(SessionState::Authenticating);

        let Some(tokens) = self.store.load_credential() else {
            tracing::debug!("No stored credential");
            return self.become_anonymous();
        };

        let result = self
            .bounded("session check", self.identity.validate(&tokens.access_token))
            .await;

        let mut slot = self.tokens();
        if self.epoch() != epoch {
            tracing::debug!("Session ended during validation, discarding result");
            return self.state();
        }
        match result {
            Ok(principal) => {
                tracing::debug!(principal = %principal.id, "Stored session is valid");
                *slot = Some(tokens);
                self.become_authenticated(principal)
            }
            Err(e) => {
                if e.is_credential_rejection() {
                    tracing::debug!(error = %e, "Stored session rejected");
                    self.store.clear_credential();
                } else {
                    tracing::debug!(error = %e, "Session check failed, keeping stored credential");
                }
                self.become_anonymous()
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] when the backend refuses the pair,
    /// [`AuthError::NetworkOrServerError`] for anything else, including a
    /// logout that raced the login.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Principal, AuthError> {
        // a login settles the session; a later startup check has nothing to do
        self.validation_started.store(true, Ordering::SeqCst);
        let epoch = self.epoch();
        let previous = self.state.send_replace(SessionState::Authenticating);

        let tokens = match self.bounded("login", self.identity.login(identifier, secret)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                let kind = AuthError::from_login(&e);
                tracing::debug!(error = %e, ?kind, "Login rejected");
                self.restore_after_failure(epoch, previous);
                return Err(kind);
            }
        };

        let principal = match self
            .bounded("principal lookup", self.identity.validate(&tokens.access_token))
            .await
        {
            Ok(principal) => principal,
            Err(e) => {
                tracing::warn!(error = %e, "Fresh token could not be validated");
                self.restore_after_failure(epoch, previous);
                return Err(AuthError::NetworkOrServerError);
            }
        };

        if !self.install_session(epoch, tokens, principal.clone()) {
            tracing::debug!("Session ended during login, discarding tokens");
            return Err(AuthError::NetworkOrServerError);
        }
        tracing::info!(principal = %principal.id, "Login successful");
        Ok(principal)
    }

    /// Create an account. The caller stays signed out and must log in explicitly.
    ///
    /// # Errors
    ///
    /// [`AuthError::DuplicateIdentifier`] when the identifier exists,
    /// [`AuthError::ValidationError`] for other rejections,
    /// [`AuthError::NetworkOrServerError`] when the backend was unreachable.
    pub async fn register(&self, account: &NewAccount) -> Result<Principal, AuthError> {
        match self
            .bounded("registration", self.identity.create_account(account))
            .await
        {
            Ok(principal) => {
                tracing::info!(principal = %principal.id, "Account created");
                Ok(principal)
            }
            Err(e) => {
                let kind = AuthError::from_registration(&e);
                tracing::debug!(error = %e, ?kind, "Registration rejected");
                Err(kind)
            }
        }
    }

    /// Request a password-reset mail.
    ///
    /// Any answer from the backend counts as success so the result never
    /// reveals whether the identifier exists.
    ///
    /// # Errors
    ///
    /// [`AuthError::NetworkOrServerError`] only when the backend could not be reached.
    pub async fn request_password_reset(&self, identifier: &str) -> Result<(), AuthError> {
        let request = self
            .identity
            .request_reset(identifier, self.reset_url.as_ref());
        match self.bounded("password reset", request).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport() => {
                tracing::warn!(error = %e, "Password reset request did not reach the backend");
                Err(AuthError::NetworkOrServerError)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Password reset answered with an error, reporting success");
                Ok(())
            }
        }
    }

    /// End the session. Always succeeds locally.
    ///
    /// Local state is cleared before the remote revocation is attempted, so
    /// dropping this future midway still leaves the client signed out.
    pub async fn logout(&self) {
        let tokens = self.end_session();

        if let Some(tokens) = tokens {
            let revoke = self.identity.invalidate(&tokens.refresh_token);
            if let Err(e) = self.bounded("logout", revoke).await {
                tracing::warn!(error = %e, "Remote token invalidation failed");
            }
        }
        tracing::info!("Logged out");
    }

    /// Run an authenticated request with the current access token.
    ///
    /// If the token is rejected, one refresh exchange is attempted and the
    /// request retried once. A second rejection or a refused refresh demotes
    /// the session.
    ///
    /// # Errors
    ///
    /// [`RequestError::NotAuthenticated`] without a session (nothing is sent),
    /// [`RequestError::SessionExpired`] after demotion, or
    /// [`RequestError::Backend`] for failures unrelated to the token.
    pub async fn authorized<T, F, Fut>(&self, mut call: F) -> Result<T, RequestError>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let epoch = self.epoch();
        let mut tokens = self
            .current_tokens()
            .ok_or(RequestError::NotAuthenticated)?;
        let mut cycle = RefreshCycle::new();

        loop {
            let err = match call(tokens.access_token.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_token_rejection() => e,
                Err(e) => return Err(RequestError::Backend(e)),
            };

            if cycle.token_rejected() == RefreshPhase::Anonymous {
                tracing::debug!(error = %err, "Token rejected after refresh");
                self.demote(epoch);
                return Err(RequestError::SessionExpired);
            }

            match self
                .bounded("token refresh", self.identity.refresh(&tokens.refresh_token))
                .await
            {
                Ok(fresh) => {
                    if !self.install_refreshed(epoch, &fresh) {
                        return Err(RequestError::NotAuthenticated);
                    }
                    cycle.refresh_succeeded();
                    tracing::debug!("Access token refreshed");
                    tokens = fresh;
                }
                Err(e) if !e.is_credential_rejection() => {
                    cycle.refresh_interrupted();
                    tracing::warn!(error = %e, "Token refresh failed, keeping session");
                    return Err(RequestError::Backend(e));
                }
                Err(e) => {
                    cycle.refresh_rejected();
                    tracing::debug!(error = %e, "Refresh token rejected");
                    self.demote(epoch);
                    return Err(RequestError::SessionExpired);
                }
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout(operation))?
    }

    fn tokens(&self) -> MutexGuard<'_, Option<TokenPair>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_tokens(&self) -> Option<TokenPair> {
        if !self.is_authenticated() {
            return None;
        }
        self.tokens().clone()
    }

    // Every session transition below runs under the token lock, so an epoch
    // check and the write it guards cannot interleave with `end_session`.

    fn install_session(&self, epoch: u64, tokens: TokenPair, principal: Principal) -> bool {
        let mut slot = self.tokens();
        if self.epoch() != epoch {
            return false;
        }
        self.store.save_credential(&tokens);
        *slot = Some(tokens);
        self.become_authenticated(principal);
        true
    }

    fn install_refreshed(&self, epoch: u64, fresh: &TokenPair) -> bool {
        let mut slot = self.tokens();
        // a logout while the refresh was in flight wins
        if self.epoch() != epoch || slot.is_none() {
            return false;
        }
        self.store.save_credential(fresh);
        *slot = Some(fresh.clone());
        true
    }

    /// Forced transition to anonymous, unless the session already ended.
    fn demote(&self, epoch: u64) {
        let mut slot = self.tokens();
        if self.epoch() == epoch {
            tracing::info!("Session expired, signing out");
            self.end_locked(&mut slot);
        }
    }

    fn end_session(&self) -> Option<TokenPair> {
        let mut slot = self.tokens();
        self.end_locked(&mut slot)
    }

    fn end_locked(&self, slot: &mut Option<TokenPair>) -> Option<TokenPair> {
        let tokens = slot.take();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.store.clear_credential();
        self.become_anonymous();
        tokens
    }

    fn restore_after_failure(&self, epoch: u64, previous: SessionState) {
        let _slot = self.tokens();
        if self.epoch() != epoch {
            return;
        }
        match previous {
            SessionState::Authenticated(_) => {
                self.state.send_replace(previous);
            }
            _ => {
                self.become_anonymous();
            }
        }
    }

    fn become_authenticated(&self, principal: Principal) -> SessionState {
        let state = SessionState::Authenticated(principal);
        self.state.send_replace(state.clone());
        state
    }

    fn become_anonymous(&self) -> SessionState {
        self.state.send_replace(SessionState::Anonymous);
        SessionState::Anonymous
    }
}
