//! Authentication lifecycle for a hosted backend.
//!
//! [`SessionManager`] owns the state machine
//! `Unknown → Authenticating → Authenticated | Anonymous` and the token pair
//! behind it. Failures a user can act on (bad password, duplicate email)
//! surface as [`AuthError`]; expired or missing tokens quietly demote the
//! session to `Anonymous`.
//!
//! ```rust,ignore
//! use portal_session::session::SessionManager;
//! use portal_session::token_store::{FileStorage, TokenStore};
//!
//! let store = TokenStore::new(FileStorage::new("session.json"), settings.storage_key());
//! let session = SessionManager::new(client, store);
//!
//! match session.validate_existing_session().await {
//!     SessionState::Authenticated(user) => println!("welcome back {}", user.display_name()),
//!     _ => session.login("user@example.com", "secret").await?,
//! }
//! ```

mod error;
mod manager;
mod refresh;
mod traits;

pub use error::{AuthError, RequestError};
pub use manager::{SessionManager, SessionState};
pub use refresh::{RefreshCycle, RefreshPhase};
pub use traits::IdentityEndpoint;
