use std::{process, sync::Arc};

use scriptorium::{
    application::error::AppError,
    cache::{CacheConfig, QueryCacheProvider, build_store},
    config::{self, Settings},
    drive::{TokenService, spawn_refresher},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
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
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ClearCache(_) => run_clear_cache(settings).await,
    }
}

async fn build_provider(settings: &Settings) -> Result<Arc<QueryCacheProvider>, AppError> {
    let config = CacheConfig::from(&settings.cache);
    let store = build_store(&config)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        backend = ?config.backend,
        namespace = %config.namespace,
        enabled = config.enabled,
        "query cache ready"
    );
    Ok(Arc::new(QueryCacheProvider::new(store, config)))
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let cache = build_provider(&settings).await?;

    let drive = if settings.drive.enabled {
        let service = TokenService::from_settings(&settings.drive)
            .map_err(|err| AppError::from(InfraError::from(err)))?;
        info!(graph = %service.graph_base_url(), "drive integration enabled");
        Some(Arc::new(service))
    } else {
        None
    };

    let refresher = drive
        .clone()
        .map(|service| spawn_refresher(service, settings.drive.refresh_interval));

    let router = http::build_router(HttpState { cache, drive });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(refresher) = refresher {
        let grace = settings.server.graceful_shutdown;
        if tokio::time::timeout(grace, refresher.shutdown())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = grace.as_secs(),
                "drive token refresher did not stop in time"
            );
        }
    }

    served.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
    info!("server stopped");
    Ok(())
}

async fn run_clear_cache(settings: Settings) -> Result<(), AppError> {
    let cache = build_provider(&settings).await?;
    let removed = cache
        .clear_all()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(removed, namespace = %cache.config().namespace, "query cache cleared");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
