// src/lib.rs
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::Handle;
use http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method};
use thiserror::Error;
use tokio::signal::ctrl_c;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod feed;
pub mod handlers;
pub mod identity;
pub mod live;
pub mod models;
pub mod policy;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod tally;

use clock::SystemClock;
use config::{Config, ConfigError, StoreKind};
use feed::ChangeFeed;
use services::VotingService;
use state::AppState;
use store::{MemoryStore, PgStore, StoreError, VotingStore};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Server failed: {0}")]
    Io(#[from] std::io::Error),
}

pub fn init_tracing() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

pub async fn start_server() -> Result<(), ServerError> {
    info!("Loading configuration...");
    let config = Config::load()?;
    let feed = ChangeFeed::new(config.feed_capacity);

    match config.store {
        StoreKind::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let pool = db::create_pool(database_url, config.max_connections).await?;
            db::migrate(&pool).await?;

            serve(PgStore::new(pool, feed), config).await
        }
        StoreKind::Memory => {
            warn!("Using the in-memory store, data is lost on restart");
            serve(MemoryStore::new(feed), config).await
        }
    }
}

async fn serve<S: VotingStore>(store: S, config: Config) -> Result<(), ServerError> {
    let cors = cors_layer(&config)?;
    let service = VotingService::new(store, Arc::new(SystemClock), &config.public_base_url);
    let app = routes::create_routes(AppState::new(service)).layer(cors);

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!("Server running on {address}");
    axum_server::bind(address)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("Server shut down");
    Ok(())
}

fn cors_layer(config: &Config) -> Result<CorsLayer, ConfigError> {
    let origin = match &config.cors_origin {
        Some(origin) => AllowOrigin::exact(HeaderValue::from_str(origin).map_err(|e| {
            ConfigError::Invalid {
                key: "CORS_ORIGIN",
                reason: e.to_string(),
            }
        })?),
        None => AllowOrigin::any(),
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(identity::VOTER_ID_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60)))
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    // live streams never finish on their own
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
