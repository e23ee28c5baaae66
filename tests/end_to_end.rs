//! Startup, config sync and logout against a mock backend.

#![cfg(feature = "http")]

use std::sync::Arc;

use portal_session::{
    AppConfig, BackendClient, Bootstrap, ClientSettings, ConfigLoader, ConfigOutcome, FileStorage,
    Phase, SessionManager, Startup, TokenPair, TokenStore,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type App = Bootstrap<Arc<BackendClient>, FileStorage, Arc<BackendClient>>;

fn app(server: &MockServer, storage: FileStorage) -> App {
    let settings = ClientSettings::new(server.uri().parse().unwrap());
    let client = Arc::new(BackendClient::new(settings.clone()).unwrap());
    let store = TokenStore::new(storage, settings.storage_key());
    let session = Arc::new(SessionManager::new(client.clone(), store));
    let loader = ConfigLoader::new(session, client, settings.asset_base());
    Bootstrap::new(loader, AppConfig::default())
}

async fn mount_principal(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("authorization", "Bearer acc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "u1", "first_name": "Ada", "email": "ada@example.com" }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn resumed_session_loads_branding_and_logs_out() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("GET"))
        .and(path("/items/app_config"))
        .and(header("authorization", "Bearer acc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "app_title": "MEGAMAIL", "app_color": "#3b82f6", "app_slogan": "" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let app = app(&server, FileStorage::new(&file));
    app.session()
        .token_store()
        .save_credential(&TokenPair::new("acc", "ref"));

    let Startup::Shell(sync) = app.start().await else {
        panic!("expected the stored session to be resumed");
    };
    assert_eq!(sync.run().await, ConfigOutcome::Applied { fields: 2 });

    let config = app.config();
    assert_eq!(config.app_title, "MEGAMAIL");
    assert_eq!(config.app_color, "#3b82f6");
    assert_eq!(config.app_slogan, AppConfig::default().app_slogan);

    app.logout().await;

    assert_eq!(app.phase(), Phase::EntrySurface);
    assert_eq!(app.config(), AppConfig::default());
    assert!(app.session().token_store().load_credential().is_none());
}

#[tokio::test]
async fn rejected_stored_session_lands_on_entry_surface() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "message": "Token expired.", "extensions": { "code": "TOKEN_EXPIRED" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/app_config"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, FileStorage::new(dir.path().join("session.json")));
    app.session()
        .token_store()
        .save_credential(&TokenPair::new("stale", "ref"));

    assert!(matches!(app.start().await, Startup::EntrySurface));
    assert!(app.session().token_store().load_credential().is_none());
}

#[tokio::test]
async fn backend_outage_keeps_stored_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, FileStorage::new(dir.path().join("session.json")));
    let stored = TokenPair::new("acc", "ref");
    app.session().token_store().save_credential(&stored);

    assert!(matches!(app.start().await, Startup::EntrySurface));
    assert_eq!(app.session().token_store().load_credential(), Some(stored));
}

#[tokio::test]
async fn refresh_outage_keeps_session_on_defaults() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("GET"))
        .and(path("/items/app_config"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "message": "Token expired.", "extensions": { "code": "TOKEN_EXPIRED" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, FileStorage::new(dir.path().join("session.json")));
    let stored = TokenPair::new("acc", "ref");
    app.session().token_store().save_credential(&stored);

    let Startup::Shell(sync) = app.start().await else {
        panic!("expected the stored session to be resumed");
    };
    assert_eq!(sync.run().await, ConfigOutcome::Defaults);

    assert_eq!(app.phase(), Phase::Shell);
    assert!(app.session().is_authenticated());
    assert_eq!(app.session().token_store().load_credential(), Some(stored));
}
