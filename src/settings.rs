use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_STORAGE_KEY: &str = "portal.session";
const DEFAULT_CONFIG_COLLECTION: &str = "app_config";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend client settings.
///
/// The API base URL is the only required field, so it is a constructor
/// parameter. Everything else has a default and a `with_*` override.
///
/// ```rust,ignore
/// use portal_session::ClientSettings;
///
/// let settings = ClientSettings::new("https://cms.example.com".parse()?)
///     .with_config_collection("branding")
///     .with_timeout(std::time::Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientSettings {
    pub(crate) api_url: Url,
    pub(crate) asset_base: String,
    pub(crate) config_collection: String,
    pub(crate) storage_key: String,
    pub(crate) reset_url: Option<Url>,
    pub(crate) timeout: Duration,
}

impl ClientSettings {
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        let asset_base = format!("{}/assets", api_url.as_str().trim_end_matches('/'));
        Self {
            api_url,
            asset_base,
            config_collection: DEFAULT_CONFIG_COLLECTION.into(),
            storage_key: DEFAULT_STORAGE_KEY.into(),
            reset_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create settings from environment variables.
    ///
    /// # Required env vars
    /// - `PORTAL_API_URL`: backend base URL
    ///
    /// # Optional env vars
    /// - `PORTAL_ASSET_URL`: base for bare asset ids (default `{api}/assets`)
    /// - `PORTAL_CONFIG_COLLECTION`: singleton holding the app config
    /// - `PORTAL_STORAGE_KEY`: key of the persisted credential
    /// - `PORTAL_RESET_URL`: link target for password-reset mails
    /// - `PORTAL_TIMEOUT_SECS`: bound on every network round trip
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API URL is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let api_url = std::env::var("PORTAL_API_URL")
            .map_err(|_| Error::Config("PORTAL_API_URL is required".into()))?;
        let api_url: Url = api_url
            .parse()
            .map_err(|e| Error::Config(format!("PORTAL_API_URL: {e}")))?;

        let mut settings = Self::new(api_url);

        if let Ok(base) = std::env::var("PORTAL_ASSET_URL") {
            settings = settings.with_asset_base(base);
        }
        if let Ok(collection) = std::env::var("PORTAL_CONFIG_COLLECTION") {
            settings = settings.with_config_collection(collection);
        }
        if let Ok(key) = std::env::var("PORTAL_STORAGE_KEY") {
            settings = settings.with_storage_key(key);
        }
        if let Ok(reset) = std::env::var("PORTAL_RESET_URL") {
            let url: Url = reset
                .parse()
                .map_err(|e| Error::Config(format!("PORTAL_RESET_URL: {e}")))?;
            settings = settings.with_reset_url(url);
        }
        if let Ok(secs) = std::env::var("PORTAL_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("PORTAL_TIMEOUT_SECS: {e}")))?;
            if secs == 0 {
                return Err(Error::Config("PORTAL_TIMEOUT_SECS must be positive".into()));
            }
            settings = settings.with_timeout(Duration::from_secs(secs));
        }

        Ok(settings)
    }

    /// Override the base joined to bare asset ids.
    #[must_use]
    pub fn with_asset_base(mut self, base: impl Into<String>) -> Self {
        self.asset_base = base.into();
        self
    }

    /// Override the collection holding the config record (default `app_config`).
    #[must_use]
    pub fn with_config_collection(mut self, collection: impl Into<String>) -> Self {
        self.config_collection = collection.into();
        self
    }

    /// Override the storage key of the persisted credential.
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_reset_url(mut self, url: Url) -> Self {
        self.reset_url = Some(url);
        self
    }

    /// Bound on every network round trip (default 10s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn asset_base(&self) -> &str {
        &self.asset_base
    }

    #[must_use]
    pub fn config_collection(&self) -> &str {
        &self.config_collection
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub fn reset_url(&self) -> Option<&Url> {
        self.reset_url.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
