//! Flowcap server - HTTP/WebSocket server for browser interaction capture.

use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use flowcap_server::{config, feed, logging, routes, state, sweep};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use logging::{LogConfig, LogFormat};

/// Flowcap server - aggregation pipeline for captured browser workflows.
#[derive(Parser, Debug)]
#[command(name = "flowcap-server")]
#[command(about = "HTTP/WebSocket server for browser interaction capture")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes keepalive traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "ingest=debug" or "ws::keepalive=trace")
    /// Can be specified multiple times. Targets are prefixed with "flowcap::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

use config::Config;
use state::AppState;

/// Handler for the live feed WebSocket upgrade.
async fn feed_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_feed(socket, state))
}

async fn handle_feed(socket: WebSocket, state: Arc<AppState>) {
    if let Err(e) = feed::handle_feed_socket(socket, state).await {
        tracing::error!(target: "flowcap::ws", "Feed WebSocket error: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(target: "flowcap::startup", "Loaded configuration (port: {})", config.port);

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone()));
    tracing::info!(target: "flowcap::startup", "Initialized application state");

    // Start the background maintenance sweep
    sweep::spawn_sweep(state.clone());
    tracing::info!(
        target: "flowcap::startup",
        "Started maintenance sweep (every {}s)",
        config.sweep_interval_secs
    );

    // Build router
    let api_routes = Router::new()
        // Ingestion
        .route("/events", post(routes::events::ingest))
        .route("/classify", post(routes::events::classify))
        // Workflow sessions
        .route("/sessions", get(routes::sessions::list))
        .route("/sessions/{id}", get(routes::sessions::get))
        .route("/sessions/{id}", delete(routes::sessions::delete))
        .route("/sessions/{id}/prune", post(routes::sessions::prune_session))
        .route(
            "/sessions/{id}/critical-events",
            get(routes::sessions::critical_events),
        )
        // Recordings
        .route("/recordings", get(routes::recordings::list))
        .route("/recordings/{id}", get(routes::recordings::get))
        .route("/recordings/{id}/chunks", post(routes::recordings::put_chunk))
        .route(
            "/recordings/{id}/complete",
            post(routes::recordings::complete),
        )
        // Maintenance
        .route("/cleanup", post(routes::sessions::cleanup))
        .route("/health", get(routes::health));

    let ws_routes = Router::new().route("/events", get(feed_ws));

    let app = Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "flowcap::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
