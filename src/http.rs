use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::app_config::RemoteConfig;
use crate::error::{Error, ErrorCode};
use crate::loader::ConfigEndpoint;
use crate::session::IdentityEndpoint;
use crate::settings::ClientSettings;
use crate::types::{AccessToken, NewAccount, Principal, RefreshToken, TokenPair};

/// HTTP client for the backend's identity and content APIs.
///
/// Implements both [`IdentityEndpoint`] and [`ConfigEndpoint`]; wrap it in an
/// `Arc` to share one connection pool between the session and the config
/// loader.
pub struct BackendClient {
    settings: ClientSettings,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct TokenData {
    access_token: String,
    refresh_token: String,
}

impl From<TokenData> for TokenPair {
    fn from(t: TokenData) -> Self {
        TokenPair::new(t.access_token, t.refresh_token)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<ErrorExtensions>,
}

#[derive(Deserialize)]
struct ErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

impl BackendClient {
    /// Create a client whose requests are bounded by the settings' timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(settings: ClientSettings) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self { settings, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.settings.api_url().as_str().trim_end_matches('/');
        format!("{base}/{path}")
            .parse()
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let first = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.errors.into_iter().next());

        let (code, detail) = match first {
            Some(entry) => (
                entry
                    .extensions
                    .and_then(|x| x.code)
                    .and_then(|c| c.parse::<ErrorCode>().ok()),
                entry.message,
            ),
            None => (None, body),
        };
        Err(Error::Backend {
            operation,
            status: Some(status),
            code,
            detail,
        })
    }

    async fn data<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<T, Error> {
        let response = Self::ensure_success(response, operation).await?;
        let bytes = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        Ok(envelope.data)
    }
}

impl IdentityEndpoint for BackendClient {
    async fn validate(&self, access: &AccessToken) -> Result<Principal, Error> {
        let response = self
            .http
            .get(self.endpoint("users/me")?)
            .query(&[("fields", "id,first_name,last_name,email,title,role")])
            .bearer_auth(access.as_str())
            .send()
            .await?;
        Self::data(response, "session check").await
    }

    async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, Error> {
        let body = serde_json::json!({ "email": identifier, "password": secret });
        let response = self
            .http
            .post(self.endpoint("auth/login")?)
            .json(&body)
            .send()
            .await?;
        Self::data::<TokenData>(response, "login").await.map(Into::into)
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Principal, Error> {
        let response = self
            .http
            .post(self.endpoint("users")?)
            .json(account)
            .send()
            .await?;
        Self::data(response, "registration").await
    }

    async fn request_reset(&self, identifier: &str, reset_url: Option<&Url>) -> Result<(), Error> {
        let mut body = serde_json::json!({ "email": identifier });
        if let Some(url) = reset_url {
            body["reset_url"] = url.as_str().into();
        }
        let response = self
            .http
            .post(self.endpoint("auth/password/request")?)
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response, "password reset").await?;
        Ok(())
    }

    async fn refresh(&self, refresh: &RefreshToken) -> Result<TokenPair, Error> {
        let body = serde_json::json!({ "refresh_token": refresh.as_str(), "mode": "json" });
        let response = self
            .http
            .post(self.endpoint("auth/refresh")?)
            .json(&body)
            .send()
            .await?;
        Self::data::<TokenData>(response, "token refresh")
            .await
            .map(Into::into)
    }

    async fn invalidate(&self, refresh: &RefreshToken) -> Result<(), Error> {
        let body = serde_json::json!({ "refresh_token": refresh.as_str() });
        let response = self
            .http
            .post(self.endpoint("auth/logout")?)
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response, "logout").await?;
        Ok(())
    }
}

impl ConfigEndpoint for BackendClient {
    async fn fetch_remote_config(&self, access: &AccessToken) -> Result<RemoteConfig, Error> {
        let path = format!("items/{}", self.settings.config_collection());
        let response = self
            .http
            .get(self.endpoint(&path)?)
            .bearer_auth(access.as_str())
            .send()
            .await?;
        Self::data(response, "config fetch").await
    }
}
