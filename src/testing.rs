//! In-memory backend used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use url::Url;

use crate::app_config::RemoteConfig;
use crate::error::{Error, ErrorCode};
use crate::loader::ConfigEndpoint;
use crate::session::{IdentityEndpoint, SessionManager};
use crate::token_store::{MemoryStorage, TokenStore};
use crate::types::{AccessToken, NewAccount, Principal, RefreshToken, TokenPair};

pub(crate) const CREDENTIAL_KEY: &str = "test.session";

#[derive(Default)]
struct State {
    accounts: HashMap<String, (String, Principal)>,
    access: HashMap<String, String>,
    expired: HashSet<String>,
    refresh: HashMap<String, String>,
    issued: u32,
    remote_config: Option<serde_json::Value>,
    config_failure: bool,
    offline: bool,
    outage: bool,
    latency: Duration,
    config_latency: Duration,
    calls: HashMap<&'static str, usize>,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<State>,
}

pub(crate) fn fake_session(backend: &Arc<FakeBackend>) -> SessionManager<Arc<FakeBackend>, MemoryStorage> {
    SessionManager::new(
        backend.clone(),
        TokenStore::new(MemoryStorage::new(), CREDENTIAL_KEY),
    )
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_user(email: &str, password: &str) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state();
            let principal = Principal::new("user-0")
                .with_name("Test", "User")
                .with_email(email)
                .with_title("Engineer");
            state
                .accounts
                .insert(email.to_owned(), (password.to_owned(), principal));
        }
        backend
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn issue_tokens(&self, email: &str) -> TokenPair {
        let mut state = self.state();
        state.issued += 1;
        let n = state.issued;
        let pair = TokenPair::new(format!("access-{n}"), format!("refresh-{n}"));
        state
            .access
            .insert(pair.access_token.as_str().to_owned(), email.to_owned());
        state
            .refresh
            .insert(pair.refresh_token.as_str().to_owned(), email.to_owned());
        pair
    }

    pub(crate) fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    pub(crate) fn expire_access_tokens(&self) {
        let mut state = self.state();
        let tokens: Vec<String> = state.access.drain().map(|(token, _)| token).collect();
        state.expired.extend(tokens);
    }

    pub(crate) fn revoke_refresh_tokens(&self) {
        self.state().refresh.clear();
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Answer every call with a 503, as a backend behind a failing proxy would.
    pub(crate) fn set_outage(&self, outage: bool) {
        self.state().outage = outage;
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub(crate) fn set_config_latency(&self, latency: Duration) {
        self.state().config_latency = latency;
    }

    pub(crate) fn set_remote_config(&self, config: serde_json::Value) {
        self.state().remote_config = Some(config);
    }

    pub(crate) fn set_config_failure(&self, failing: bool) {
        self.state().config_failure = failing;
    }

    async fn enter(&self, operation: &'static str) -> Result<(), Error> {
        let (latency, offline, outage) = {
            let mut state = self.state();
            *state.calls.entry(operation).or_default() += 1;
            let extra = if operation == "config" {
                state.config_latency
            } else {
                Duration::ZERO
            };
            (state.latency + extra, state.offline, state.outage)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(Error::Timeout(operation));
        }
        if outage {
            return Err(Error::Backend {
                operation,
                status: Some(503),
                code: None,
                detail: "Service Unavailable".into(),
            });
        }
        Ok(())
    }

    fn principal_for(&self, access: &AccessToken) -> Result<Principal, Error> {
        let state = self.state();
        let token = access.as_str();
        match state.access.get(token) {
            Some(email) => Ok(state.accounts[email].1.clone()),
            None if state.expired.contains(token) => {
                Err(Error::backend("validate", 401, ErrorCode::TokenExpired))
            }
            None => Err(Error::backend("validate", 401, ErrorCode::InvalidToken)),
        }
    }
}

impl IdentityEndpoint for FakeBackend {
    async fn validate(&self, access: &AccessToken) -> Result<Principal, Error> {
        self.enter("validate").await?;
        self.principal_for(access)
    }

    async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, Error> {
        self.enter("login").await?;
        let known = self
            .state()
            .accounts
            .get(identifier)
            .is_some_and(|(password, _)| password == secret);
        if !known {
            return Err(Error::backend("login", 401, ErrorCode::InvalidCredentials));
        }
        Ok(self.issue_tokens(identifier))
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Principal, Error> {
        self.enter("create_account").await?;
        if account.password.is_empty() || !account.email.contains('@') {
            return Err(Error::backend("registration", 400, ErrorCode::FailedValidation));
        }
        let mut state = self.state();
        if state.accounts.contains_key(&account.email) {
            return Err(Error::backend("registration", 400, ErrorCode::RecordNotUnique));
        }
        let mut principal =
            Principal::new(format!("user-{}", state.accounts.len())).with_email(&account.email);
        principal.first_name = account.first_name.clone();
        principal.last_name = account.last_name.clone();
        state.accounts.insert(
            account.email.clone(),
            (account.password.clone(), principal.clone()),
        );
        Ok(principal)
    }

    async fn request_reset(&self, identifier: &str, _reset_url: Option<&Url>) -> Result<(), Error> {
        self.enter("reset").await?;
        if self.state().accounts.contains_key(identifier) {
            Ok(())
        } else {
            Err(Error::backend("password reset", 403, ErrorCode::Forbidden))
        }
    }

    async fn refresh(&self, refresh: &RefreshToken) -> Result<TokenPair, Error> {
        self.enter("refresh").await?;
        let owner = self.state().refresh.remove(refresh.as_str());
        match owner {
            Some(email) => Ok(self.issue_tokens(&email)),
            None => Err(Error::backend("token refresh", 401, ErrorCode::InvalidToken)),
        }
    }

    async fn invalidate(&self, refresh: &RefreshToken) -> Result<(), Error> {
        self.enter("invalidate").await?;
        self.state().refresh.remove(refresh.as_str());
        Ok(())
    }
}

impl ConfigEndpoint for FakeBackend {
    async fn fetch_remote_config(&self, access: &AccessToken) -> Result<RemoteConfig, Error> {
        self.enter("config").await?;
        if self.state().config_failure {
            return Err(Error::Backend {
                operation: "config fetch",
                status: Some(503),
                code: None,
                detail: "unavailable".into(),
            });
        }
        self.principal_for(access)?;
        let raw = self
            .state()
            .remote_config
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        Ok(serde_json::from_value(raw)?)
    }
}
