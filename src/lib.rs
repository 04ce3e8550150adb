//! Poll site: users propose polls, moderators approve them, everyone votes once.
//!
//! The HTTP surface is in [`routes`]; the rules that matter live in [`poll`]
//! (voting, results, visibility) and [`proposal`].
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum_server::Handle;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod media;
pub mod models;
pub mod poll;
pub mod proposal;
pub mod routes;
pub mod session;
pub mod state;

use config::Config;
use state::AppState;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("poll_site=info,tower_http=info"));
    fmt().with_env_filter(filter).init();
}

fn cors_layer(origin: &str) -> Result<CorsLayer, BoxError> {
    let origin = origin.parse::<HeaderValue>()?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::COOKIE])
        .allow_credentials(true))
}

pub async fn start_server(config: Config) -> Result<(), BoxError> {
    info!("Connecting to database...");
    let pool = db::create_pool(&config).await?;
    db::migrate(&pool).await?;

    let addr = config.socket_addr();
    let cors = config.cors_origin.as_deref().map(cors_layer).transpose()?;
    let state = AppState::new(pool, config);

    let mut app = routes::create_routes(state);
    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!("Server running on {addr}");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
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

    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
