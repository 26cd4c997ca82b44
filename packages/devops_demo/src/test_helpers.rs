use std::sync::Arc;

use axum::Router;

use crate::AppState;
use crate::chat::ChatClient;
use crate::config::{ChatFileConfig, ChatSettings, RegistryFileConfig, RegistrySettings};
use crate::db::Database;
use crate::registry::RegistryClient;
use crate::repository::CallLogRepository;

/// Build an `AppState` backed by an in-memory SQLite database, with neither
/// upstream configured.
pub async fn test_app_state() -> AppState {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    crate::db::run_migrations(&pool).await.expect("migrations");

    AppState {
        db: Arc::new(Database { pool: pool.clone() }),
        call_logs: Arc::new(CallLogRepository::new(pool)),
        registry: None,
        chat: None,
        registry_settings: Arc::new(RegistrySettings::from_file(&RegistryFileConfig::default())),
        chat_settings: Arc::new(ChatSettings::from_file(&ChatFileConfig::default())),
    }
}

/// Point the registry client at `base_url` as account `demo`.
pub fn with_registry(mut state: AppState, base_url: &str) -> AppState {
    let settings = RegistrySettings {
        username: Some("demo".into()),
        token: Some("test-token".into()),
        base_url: base_url.to_string(),
        ..(*state.registry_settings).clone()
    };
    state.registry = Some(Arc::new(
        RegistryClient::new(&settings).expect("registry client"),
    ));
    state.registry_settings = Arc::new(settings);
    state
}

/// Point the chat client at `base_url` with a dummy key.
pub fn with_chat(mut state: AppState, base_url: &str) -> AppState {
    let settings = ChatSettings {
        api_key: Some("sk-test".into()),
        base_url: base_url.to_string(),
        ..(*state.chat_settings).clone()
    };
    state.chat = Some(Arc::new(ChatClient::new(&settings).expect("chat client")));
    state.chat_settings = Arc::new(settings);
    state
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake upstream");
    });
    format!("http://{addr}")
}
