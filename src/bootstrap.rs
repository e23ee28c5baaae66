//! Startup ordering: verify session, gate the UI, then load config.
//!
//! The session check always completes before any config request is issued,
//! and the authenticated shell is revealed on defaults without waiting for
//! config. The config fetch is handed back as a [`ConfigSync`] for the
//! caller to await or spawn; its result is merged into the live
//! [`AppConfig`] unless the session ended in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::app_config::AppConfig;
use crate::loader::{ConfigEndpoint, ConfigError, ConfigLoader};
use crate::session::{AuthError, IdentityEndpoint, SessionManager, SessionState};
use crate::token_store::KeyValueStorage;
use crate::types::Principal;

/// Which surface the UI should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CheckingSession,
    /// Login, registration and password reset.
    EntrySurface,
    /// The authenticated application.
    Shell,
}

/// Result of one [`Bootstrap::start`] call.
pub enum Startup<I, B, C> {
    EntrySurface,
    /// Shell revealed on defaults; drive the sync to load remote config.
    Shell(ConfigSync<I, B, C>),
    /// Startup already ran in this process.
    AlreadyStarted(Phase),
}

/// What became of a config fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// Merged into the live config.
    Applied { fields: usize },
    /// Nothing usable came back; defaults stay.
    Defaults,
    /// The session ended before the result arrived.
    Discarded,
    /// No session when the fetch was due.
    Skipped,
}

struct Inner<I, B, C> {
    loader: ConfigLoader<I, B, C>,
    defaults: AppConfig,
    phase: watch::Sender<Phase>,
    config: watch::Sender<AppConfig>,
    started: AtomicBool,
    /// Session epoch the shell was entered under.
    shell_epoch: AtomicU64,
}

impl<I, B, C> Inner<I, B, C>
where
    I: IdentityEndpoint,
    B: KeyValueStorage,
    C: ConfigEndpoint,
{
    fn reset_config(&self) {
        self.config.send_if_modified(|config| {
            if *config == self.defaults {
                return false;
            }
            *config = self.defaults.clone();
            true
        });
    }

    /// Leave the shell once the session it was entered under has ended,
    /// dropping that session's branding.
    fn reconcile(&self) {
        if *self.phase.borrow() != Phase::Shell {
            return;
        }
        if self.loader.session().epoch() == self.shell_epoch.load(Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Session ended under the shell, restoring defaults");
        self.reset_config();
        self.phase.send_replace(Phase::EntrySurface);
    }
}

/// Startup orchestrator. Cheap to clone.
pub struct Bootstrap<I, B, C> {
    inner: Arc<Inner<I, B, C>>,
}

// Manual Clone: avoid derive adding `I: Clone, B: Clone, C: Clone` bounds.
impl<I, B, C> Clone for Bootstrap<I, B, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I, B, C> Bootstrap<I, B, C>
where
    I: IdentityEndpoint,
    B: KeyValueStorage,
    C: ConfigEndpoint,
{
    #[must_use]
    pub fn new(loader: ConfigLoader<I, B, C>, defaults: AppConfig) -> Self {
        let (phase, _) = watch::channel(Phase::CheckingSession);
        let (config, _) = watch::channel(defaults.clone());
        Self {
            inner: Arc::new(Inner {
                loader,
                defaults,
                phase,
                config,
                started: AtomicBool::new(false),
                shell_epoch: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager<I, B>> {
        self.inner.loader.session()
    }

    /// Current surface. A session demoted after startup reads as the entry
    /// surface, and its config is reset to defaults.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.reconcile();
        *self.inner.phase.borrow()
    }

    /// Snapshot of the live config. Defaults once the session has ended.
    #[must_use]
    pub fn config(&self) -> AppConfig {
        self.inner.reconcile();
        self.inner.config.borrow().clone()
    }

    /// Receiver notified whenever a config merge or reset changes something.
    #[must_use]
    pub fn subscribe_config(&self) -> watch::Receiver<AppConfig> {
        self.inner.reconcile();
        self.inner.config.subscribe()
    }

    /// Run the startup sequence. Only the first call does any work.
    pub async fn start(&self) -> Startup<I, B, C> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Startup::AlreadyStarted(self.phase());
        }

        self.inner.phase.send_replace(Phase::CheckingSession);
        match self.session().validate_existing_session().await {
            SessionState::Authenticated(principal) => {
                tracing::info!(principal = %principal.id, "Resumed session");
                Startup::Shell(self.enter_shell())
            }
            _ => {
                self.inner.phase.send_replace(Phase::EntrySurface);
                Startup::EntrySurface
            }
        }
    }

    /// Interactive login from the entry surface; re-enters the shell without a restart.
    ///
    /// # Errors
    ///
    /// The classified [`AuthError`] from [`SessionManager::login`].
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<(Principal, ConfigSync<I, B, C>), AuthError> {
        let principal = self.session().login(identifier, secret).await?;
        Ok((principal, self.enter_shell()))
    }

    /// Sign out and return to the entry surface with default config.
    pub async fn logout(&self) {
        self.session().logout().await;
        self.inner.reset_config();
        self.inner.phase.send_replace(Phase::EntrySurface);
    }

    fn enter_shell(&self) -> ConfigSync<I, B, C> {
        let epoch = self.session().epoch();
        // each session starts from defaults, never from a previous session's branding
        self.inner.reset_config();
        self.inner.shell_epoch.store(epoch, Ordering::SeqCst);
        self.inner.phase.send_replace(Phase::Shell);
        ConfigSync {
            inner: self.inner.clone(),
            epoch,
        }
    }
}

/// Pending config fetch bound to the session epoch it was issued under.
#[must_use = "the remote config is only loaded when the sync is run"]
pub struct ConfigSync<I, B, C> {
    inner: Arc<Inner<I, B, C>>,
    epoch: u64,
}

impl<I, B, C> ConfigSync<I, B, C>
where
    I: IdentityEndpoint,
    B: KeyValueStorage,
    C: ConfigEndpoint,
{
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Fetch the remote config and merge it into the live config.
    pub async fn run(self) -> ConfigOutcome {
        let session = self.inner.loader.session();
        if session.epoch() != self.epoch {
            return self.discard();
        }

        let patch = match self.inner.loader.fetch_config().await {
            Ok(patch) => patch,
            Err(ConfigError::NotAuthenticated) => return ConfigOutcome::Skipped,
            Err(e) => {
                tracing::warn!(error = %e, "Config sync failed");
                return ConfigOutcome::Defaults;
            }
        };

        if session.epoch() != self.epoch {
            return self.discard();
        }
        if patch.is_empty() {
            return ConfigOutcome::Defaults;
        }

        // epoch check and merge happen under the config write lock, so a
        // logout cannot slip in between them
        let mut stale = false;
        self.inner.config.send_if_modified(|config| {
            if session.epoch() != self.epoch {
                stale = true;
                return false;
            }
            config.merge(&patch)
        });
        if stale {
            return self.discard();
        }
        tracing::info!(fields = patch.len(), "Remote config applied");
        ConfigOutcome::Applied {
            fields: patch.len(),
        }
    }

    fn discard(&self) -> ConfigOutcome {
        tracing::debug!("Discarding config fetched for an ended session");
        self.inner.reconcile();
        ConfigOutcome::Discarded
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeBackend, fake_session};
    use crate::token_store::MemoryStorage;

    type FakeBootstrap = Bootstrap<Arc<FakeBackend>, MemoryStorage, Arc<FakeBackend>>;

    fn bootstrap(backend: &Arc<FakeBackend>) -> FakeBootstrap {
        let loader = ConfigLoader::new(
            Arc::new(fake_session(backend)),
            backend.clone(),
            "https://cms.example.com/assets",
        );
        Bootstrap::new(loader, AppConfig::default())
    }

    fn branded_backend() -> Arc<FakeBackend> {
        let backend = Arc::new(FakeBackend::with_user("user@example.com", "pw"));
        backend.set_remote_config(serde_json::json!({
            "app_title": "MEGAMAIL",
            "app_color": "#3b82f6"
        }));
        backend
    }

    #[tokio::test]
    async fn anonymous_start_skips_config() {
        let backend = branded_backend();
        let app = bootstrap(&backend);

        assert!(matches!(app.start().await, Startup::EntrySurface));
        assert_eq!(app.phase(), Phase::EntrySurface);
        assert_eq!(backend.calls("config"), 0);
        assert_eq!(app.config(), AppConfig::default());
    }

    #[tokio::test]
    async fn resumed_session_reveals_shell_before_config() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        let tokens = backend.issue_tokens("user@example.com");
        app.session().token_store().save_credential(&tokens);

        let Startup::Shell(sync) = app.start().await else {
            panic!("expected shell");
        };
        assert_eq!(app.phase(), Phase::Shell);
        assert_eq!(app.config(), AppConfig::default());
        assert_eq!(backend.calls("config"), 0);

        assert_eq!(sync.run().await, ConfigOutcome::Applied { fields: 2 });
        assert_eq!(app.config().app_title, "MEGAMAIL");
        assert_eq!(app.config().welcome_message, AppConfig::default().welcome_message);
    }

    #[tokio::test]
    async fn start_runs_once() {
        let backend = branded_backend();
        let app = bootstrap(&backend);

        app.start().await;
        assert!(matches!(
            app.start().await,
            Startup::AlreadyStarted(Phase::EntrySurface)
        ));
    }

    #[tokio::test]
    async fn login_from_entry_surface_enters_shell() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        let mut updates = app.subscribe_config();
        app.start().await;

        let (principal, sync) = app.login("user@example.com", "pw").await.unwrap();
        assert_eq!(principal.email.as_deref(), Some("user@example.com"));
        assert_eq!(app.phase(), Phase::Shell);

        assert_eq!(sync.run().await, ConfigOutcome::Applied { fields: 2 });
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().app_title, "MEGAMAIL");
    }

    #[tokio::test]
    async fn failed_login_stays_on_entry_surface() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        app.start().await;

        let err = app.login("user@example.com", "wrong").await.err();

        assert_eq!(err, Some(AuthError::InvalidCredentials));
        assert_eq!(app.phase(), Phase::EntrySurface);
    }

    #[tokio::test]
    async fn config_after_logout_is_discarded() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        app.start().await;
        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();

        app.logout().await;

        assert_eq!(sync.run().await, ConfigOutcome::Discarded);
        assert_eq!(app.config(), AppConfig::default());
        assert_eq!(app.phase(), Phase::EntrySurface);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_config_is_discarded_on_logout() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        app.start().await;
        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();
        backend.set_config_latency(Duration::from_secs(5));

        let pending = tokio::spawn(sync.run());
        tokio::time::sleep(Duration::from_secs(1)).await;
        app.logout().await;

        assert_eq!(pending.await.unwrap(), ConfigOutcome::Discarded);
        assert_eq!(app.config(), AppConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_session_check_lands_on_entry_surface() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        let tokens = backend.issue_tokens("user@example.com");
        app.session().token_store().save_credential(&tokens);
        backend.set_latency(Duration::from_secs(86_400));
        let started = tokio::time::Instant::now();

        assert!(matches!(app.start().await, Startup::EntrySurface));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(app.phase(), Phase::EntrySurface);
        assert_eq!(backend.calls("config"), 0);
    }

    #[tokio::test]
    async fn forced_demotion_drops_branding() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        app.start().await;
        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();
        assert_eq!(sync.run().await, ConfigOutcome::Applied { fields: 2 });
        assert_eq!(app.config().app_title, "MEGAMAIL");

        let expired: Result<(), _> = app
            .session()
            .authorized(|_| async {
                Err(crate::error::Error::backend(
                    "items",
                    401,
                    crate::error::ErrorCode::TokenExpired,
                ))
            })
            .await;
        assert!(expired.is_err());

        assert_eq!(app.phase(), Phase::EntrySurface);
        assert_eq!(app.config(), AppConfig::default());
    }

    #[tokio::test]
    async fn next_login_starts_from_defaults() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        app.start().await;
        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();
        sync.run().await;
        backend.expire_access_tokens();
        backend.revoke_refresh_tokens();
        let _ = app
            .session()
            .authorized(|access| {
                let backend = backend.clone();
                async move { backend.fetch_remote_config(&access).await }
            })
            .await;

        backend.set_remote_config(serde_json::json!({ "app_color": "#22c55e" }));
        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();
        assert_eq!(sync.run().await, ConfigOutcome::Applied { fields: 1 });

        let config = app.config();
        assert_eq!(config.app_color, "#22c55e");
        assert_eq!(config.app_title, AppConfig::default().app_title);
    }

    #[tokio::test]
    async fn failing_config_keeps_shell_on_defaults() {
        let backend = branded_backend();
        backend.set_config_failure(true);
        let app = bootstrap(&backend);
        app.start().await;

        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();

        assert_eq!(sync.run().await, ConfigOutcome::Defaults);
        assert_eq!(app.phase(), Phase::Shell);
        assert_eq!(app.config(), AppConfig::default());
    }

    #[tokio::test]
    async fn demoted_session_reads_as_entry_surface() {
        let backend = branded_backend();
        let app = bootstrap(&backend);
        app.start().await;
        let (_, sync) = app.login("user@example.com", "pw").await.unwrap();
        backend.expire_access_tokens();
        backend.revoke_refresh_tokens();

        assert_eq!(sync.run().await, ConfigOutcome::Discarded);
        assert_eq!(app.phase(), Phase::EntrySurface);
    }
}
