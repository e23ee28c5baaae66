use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{AppConfigPatch, RemoteConfig};
use crate::error::Error;
use crate::session::{IdentityEndpoint, RequestError, SessionManager};
use crate::settings::DEFAULT_TIMEOUT;
use crate::token_store::KeyValueStorage;
use crate::types::AccessToken;

/// Remote source of the single config record. Requires a valid session.
pub trait ConfigEndpoint: Send + Sync + 'static {
    fn fetch_remote_config(
        &self,
        access: &AccessToken,
    ) -> impl Future<Output = Result<RemoteConfig, Error>> + Send;
}

impl<T: ConfigEndpoint> ConfigEndpoint for Arc<T> {
    fn fetch_remote_config(
        &self,
        access: &AccessToken,
    ) -> impl Future<Output = Result<RemoteConfig, Error>> + Send {
        (**self).fetch_remote_config(access)
    }
}

/// Config fetch failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Rejected before any request was made.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Fetch or mapping failed. Never escapes [`ConfigLoader::fetch_config`];
    /// defaults apply instead.
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),
}

/// Fetches and normalizes the remote config record.
pub struct ConfigLoader<I, B, C> {
    session: Arc<SessionManager<I, B>>,
    endpoint: C,
    asset_base: String,
    timeout: Duration,
}

impl<I, B, C> ConfigLoader<I, B, C>
where
    I: IdentityEndpoint,
    B: KeyValueStorage,
    C: ConfigEndpoint,
{
    #[must_use]
    pub fn new(
        session: Arc<SessionManager<I, B>>,
        endpoint: C,
        asset_base: impl Into<String>,
    ) -> Self {
        Self {
            session,
            endpoint,
            asset_base: asset_base.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound the whole fetch, refresh included (default 10s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager<I, B>> {
        &self.session
    }

    /// Fetch the config record as a patch of present, non-empty fields.
    ///
    /// Any fetch or mapping failure yields an empty patch.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotAuthenticated`] when called without a session; no
    /// request is made in that case.
    pub async fn fetch_config(&self) -> Result<AppConfigPatch, ConfigError> {
        if !self.session.is_authenticated() {
            return Err(ConfigError::NotAuthenticated);
        }

        match self.try_fetch().await {
            Ok(patch) => {
                tracing::debug!(fields = patch.len(), "Remote config loaded");
                Ok(patch)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Using default config");
                Ok(AppConfigPatch::default())
            }
        }
    }

    async fn try_fetch(&self) -> Result<AppConfigPatch, ConfigError> {
        let request = self.session.authorized(|access| {
            let endpoint = &self.endpoint;
            async move { endpoint.fetch_remote_config(&access).await }
        });

        let result = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ConfigError::ConfigUnavailable("config fetch timed out".into()))?;

        match result {
            Ok(remote) => Ok(remote.into_patch(&self.asset_base)),
            Err(RequestError::SessionExpired) => Err(ConfigError::ConfigUnavailable(
                "session expired during fetch".into(),
            )),
            Err(e) => Err(ConfigError::ConfigUnavailable(e.to_string())),
        }
    }
}
