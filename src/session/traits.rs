use std::future::Future;
use std::sync::Arc;

use url::Url;

use crate::error::Error;
use crate::types::{AccessToken, NewAccount, Principal, RefreshToken, TokenPair};

/// Remote identity service.
///
/// Implemented by [`BackendClient`](crate::http::BackendClient) over HTTP;
/// tests substitute in-memory fakes.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentityEndpoint for MyBackend {
///     async fn validate(&self, access: &AccessToken) -> Result<Principal, Error> {
///         self.users.me(access.as_str()).await
///     }
///     // ...
/// }
/// ```
pub trait IdentityEndpoint: Send + Sync + 'static {
    /// Resolve the principal owning `access`. Fails if the token is expired or invalid.
    fn validate(
        &self,
        access: &AccessToken,
    ) -> impl Future<Output = Result<Principal, Error>> + Send;

    /// Exchange credentials for a token pair.
    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<TokenPair, Error>> + Send;

    /// Create a new principal. Does not sign anyone in.
    fn create_account(
        &self,
        account: &NewAccount,
    ) -> impl Future<Output = Result<Principal, Error>> + Send;

    /// Ask the backend to mail a reset link to `identifier`.
    fn request_reset(
        &self,
        identifier: &str,
        reset_url: Option<&Url>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Mint a new token pair from a refresh token.
    fn refresh(
        &self,
        refresh: &RefreshToken,
    ) -> impl Future<Output = Result<TokenPair, Error>> + Send;

    /// Revoke a refresh token on the backend.
    fn invalidate(&self, refresh: &RefreshToken) -> impl Future<Output = Result<(), Error>> + Send;
}

impl<T: IdentityEndpoint> IdentityEndpoint for Arc<T> {
    fn validate(
        &self,
        access: &AccessToken,
    ) -> impl Future<Output = Result<Principal, Error>> + Send {
        (**self).validate(access)
    }

    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<TokenPair, Error>> + Send {
        (**self).login(identifier, secret)
    }

    fn create_account(
        &self,
        account: &NewAccount,
    ) -> impl Future<Output = Result<Principal, Error>> + Send {
        (**self).create_account(account)
    }

    fn request_reset(
        &self,
        identifier: &str,
        reset_url: Option<&Url>,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).request_reset(identifier, reset_url)
    }

    fn refresh(
        &self,
        refresh: &RefreshToken,
    ) -> impl Future<Output = Result<TokenPair, Error>> + Send {
        (**self).refresh(refresh)
    }

    fn invalidate(&self, refresh: &RefreshToken) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).invalidate(refresh)
    }
}
