#![doc = include_str!("../README.md")]

pub mod app_config;
pub mod bootstrap;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod ingest;
pub mod loader;
pub mod session;
pub mod settings;
pub mod token_store;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use app_config::{AppConfig, AppConfigPatch, RemoteConfig, resolve_asset};
pub use bootstrap::{Bootstrap, ConfigOutcome, ConfigSync, Phase, Startup};
pub use error::{Error, ErrorCode};
#[cfg(feature = "http")]
pub use http::BackendClient;
pub use ingest::{IngestTimings, IngestionSimulator, UploadRecord, UploadStatus};
pub use loader::{ConfigEndpoint, ConfigError, ConfigLoader};
pub use session::{
    AuthError, IdentityEndpoint, RefreshCycle, RefreshPhase, RequestError, SessionManager,
    SessionState,
};
pub use settings::ClientSettings;
pub use token_store::{FileStorage, KeyValueStorage, MemoryStorage, TokenStore};
pub use types::{AccessToken, NewAccount, Principal, PrincipalId, RefreshToken, TokenPair};
