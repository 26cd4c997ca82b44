use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod chat;
mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod registry;
mod repository;
mod routes;
mod stopwatch;
#[cfg(test)]
mod test_helpers;

use crate::chat::ChatClient;
use crate::config::{AppConfig, ChatSettings, FileConfig, RegistrySettings};
use crate::db::Database;
use crate::registry::RegistryClient;
use crate::repository::CallLogRepository;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "devops-demo")]
#[command(about = "Demo API proxying a container registry and a chat model, with a call log")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.devops_demo)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server in the foreground (the default)
    Serve(ServeArgs),

    /// Print call-log statistics
    Stats,

    /// List repository names of the configured registry account
    Repos(ReposArgs),

    /// List tag names of one repository
    Tags(TagsArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct ReposArgs {
    /// Items requested per page
    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Parser)]
struct TagsArgs {
    /// Repository name
    repo: String,

    /// Items requested per page
    #[arg(long)]
    page_size: Option<u32>,
}

/// Shared handler state. Everything here is read-only after startup.
#[derive(Clone)]
pub(crate) struct AppState {
    pub db: Arc<Database>,
    pub call_logs: Arc<CallLogRepository>,
    /// Present only when both registry credentials are configured
    pub registry: Option<Arc<RegistryClient>>,
    /// Present only when an API key is configured
    pub chat: Option<Arc<ChatClient>>,
    pub registry_settings: Arc<RegistrySettings>,
    pub chat_settings: Arc<ChatSettings>,
}

impl AppState {
    fn new(db: Database, file_config: &FileConfig) -> Result<Self> {
        let registry_settings = RegistrySettings::from_file(&file_config.registry);
        let chat_settings = ChatSettings::from_file(&file_config.chat);

        let registry = if registry_settings.is_configured() {
            Some(Arc::new(
                RegistryClient::new(&registry_settings)
                    .context("Failed to build registry client")?,
            ))
        } else {
            warn!("Registry credentials not configured; /api/docker endpoints will fail");
            None
        };

        let chat = if chat_settings.is_configured() {
            Some(Arc::new(
                ChatClient::new(&chat_settings).context("Failed to build chat client")?,
            ))
        } else {
            warn!("Chat API key not configured; /api/ai/chat will fail");
            None
        };

        let call_logs = Arc::new(CallLogRepository::new(db.pool.clone()));

        Ok(Self {
            db: Arc::new(db),
            call_logs,
            registry,
            chat,
            registry_settings: Arc::new(registry_settings),
            chat_settings: Arc::new(chat_settings),
        })
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "devops_demo=debug,tower_http=debug,info"
    } else {
        "devops_demo=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_file_config(config: &AppConfig) -> Result<FileConfig> {
    config::load_config(&config.config_toml_path())
        .extract()
        .with_context(|| {
            format!(
                "Invalid configuration in {}",
                config.config_toml_path().display()
            )
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(&cli.command, Some(Commands::Serve(args)) if args.debug);
    init_tracing(debug);

    let config = AppConfig::new(cli.data_dir)?;

    match cli.command {
        None => run_server(ServeArgs::default(), config).await,
        Some(Commands::Serve(args)) => run_server(args, config).await,
        Some(Commands::Stats) => cli::stats_command(&config).await,
        Some(Commands::Repos(args)) => {
            cli::repos_command(&load_file_config(&config)?, args.page_size).await
        }
        Some(Commands::Tags(args)) => {
            cli::tags_command(&load_file_config(&config)?, &args.repo, args.page_size).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, cleaning up...");
}

async fn run_server(args: ServeArgs, config: AppConfig) -> Result<()> {
    info!("Starting DevOps demo API");

    let file_config = load_file_config(&config)?;
    let host = args.host.unwrap_or_else(|| file_config.server.host.clone());
    let port = args.port.unwrap_or(file_config.server.port);

    info!("Initializing database...");
    let db = Database::new(&config).await?;

    let state = AppState::new(db, &file_config)?;
    let pool_for_shutdown = state.db.pool.clone();

    let app = routes::api_routes()
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", host, port).parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/health                    - Health and configuration status");
    info!("  GET    /api/docker/repos              - Registry repositories");
    info!("  GET    /api/docker/tags/{{repo_name}}   - Tags of one repository");
    info!("  POST   /api/ai/chat                   - Chat completion");
    info!("  GET    /api/logs                      - Call log (paginated)");
    info!("  GET    /api/logs/stats                - Call log statistics");
    info!("  GET    /api/logs/{{id}}                 - One call log entry");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    pool_for_shutdown.close().await;
    info!("Shutdown complete");
    server_result
}
