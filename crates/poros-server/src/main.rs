//! Poros server binary.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, background session sweeping, and graceful shutdown on
//! SIGTERM/SIGINT.

use poros_orchestrator::{
    start_session_sweeper, Orchestrator, OrchestratorSettings, SessionSettings, SessionStore,
};
use poros_ranking::{Ranker, SemanticScorer};
use poros_server::{app, config, middleware::RateLimiter, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("POROS_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().unwrap_or("config.toml");

    // Load configuration
    let config = config::load_config(Some(selected_config_path))
        .expect("failed to load configuration; the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path,
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = poros_db::open_pool(
        &config.database.path,
        poros_db::DbSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            max_connections: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool; check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = poros_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Assemble the pipeline: one HTTP client, one ranker, one session
    // store shared between the orchestrator and its sweeper.
    let http = reqwest::Client::new();
    let ranker = Ranker::new(config.ranking, SemanticScorer::keyword());
    let sessions = SessionStore::new(SessionSettings {
        ttl: Duration::from_secs(config.session.ttl_secs),
        max_entries: config.session.max_entries,
    });

    let orchestrator = Orchestrator::new(
        pool.clone(),
        ranker,
        http.clone(),
        sessions.clone(),
        OrchestratorSettings {
            dispatch_timeout: Duration::from_secs(config.orchestrator.dispatch_timeout_secs),
            default_max_agents: config.orchestrator.default_max_agents,
            max_agents_cap: config.orchestrator.max_agents_cap,
            ema_decay: config.orchestrator.ema_decay,
        },
    );

    tokio::spawn(start_session_sweeper(
        sessions,
        config.session.sweep_interval_secs,
    ));

    let state = AppState {
        pool,
        orchestrator: Arc::new(orchestrator),
        http,
        relay_timeout: Duration::from_secs(config.orchestrator.dispatch_timeout_secs),
        rate_limiter: RateLimiter::new(),
        rate_limits: config.rate_limit.clone(),
    };

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting poros server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    // Serve with graceful shutdown. Connect info feeds the per-IP rate
    // limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("poros server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
