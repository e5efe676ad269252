//! Storefront and admin back office over a pluggable commerce provider.
//!
//! # Layout
//! - `/{locale}/...`: storefront views as JSON, behind the locale redirect
//! - `/api/cart`, `/api/auth`, `/api/orders`: customer session routes
//! - `/api/admin/...`: admin proxy to the customer backend
//!
//! # Setup
//!
//! Run against the built-in catalog.
//! ```sh
//! APP_ENV=development RUST_LOG=info cargo run --bin storefront
//! ```
//!
//! Snapshot a custom backend for offline use.
//! ```sh
//! cargo run --bin catalog-sync -- --output catalog.json
//! LOCAL_CATALOG_PATH=catalog.json cargo run --bin storefront
//! ```
use anyhow::Result;
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod admin;
pub mod auth;
pub mod cart;
pub mod config;
pub mod error;
pub mod locale;
pub mod routes;
pub mod state;
pub mod storefront;
pub mod utils;

use routes::router;
use state::State;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::init()?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
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
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
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
}
