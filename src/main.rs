use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use axum::http::StatusCode;
use bookshelf::{
    application::error::{AppError, ErrorReport},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use tokio::{signal, sync::Notify};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = ErrorReport::from_error("main", StatusCode::INTERNAL_SERVER_ERROR, error).messages;
    let log = || error!(error = %error, chain = ?chain, "application error");

    if dispatcher::has_been_set() {
        log();
        return;
    }

    // Telemetry may not be installed yet when configuration fails.
    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, log);
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_state(&settings).await?;
    serve_http(&settings, state).await
}

async fn build_state(settings: &config::Settings) -> Result<ApiState, AppError> {
    match settings.database.url.as_deref() {
        Some(database_url) => {
            let pool =
                PostgresRepositories::connect(database_url, settings.database.max_connections.get())
                    .await
                    .map_err(InfraError::Connect)?;

            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(InfraError::Migrate)?;

            info!(
                target = "bookshelf::startup",
                max_connections = settings.database.max_connections.get(),
                "using postgres store"
            );
            let store = Arc::new(PostgresRepositories::new(pool));
            Ok(http::build_api_state(store, settings))
        }
        None => {
            warn!(
                target = "bookshelf::startup",
                "database.url is not configured; data lives in memory and is lost on exit"
            );
            let store = Arc::new(InMemoryRepositories::new());
            Ok(http::build_api_state(store, settings))
        }
    }
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;

    info!(
        target = "bookshelf::startup",
        addr = %settings.server.addr,
        public_base_url = %settings.server.public_base_url,
        cache_enabled = settings.cache.enabled,
        "listening"
    );

    let draining = Arc::new(Notify::new());
    let signal_draining = draining.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_draining.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(InfraError::Serve)?;
            info!(target = "bookshelf::shutdown", "server stopped");
        }
        _ = drain_deadline(draining, settings.server.graceful_shutdown) => {
            warn!(
                target = "bookshelf::shutdown",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn drain_deadline(draining: Arc<Notify>, grace: Duration) {
    draining.notified().await;
    tokio::time::sleep(grace).await;
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(target = "bookshelf::shutdown", "received ctrl-c");
        },
        _ = terminate => {
            info!(target = "bookshelf::shutdown", "received SIGTERM");
        },
    }
}
