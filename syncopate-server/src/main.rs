use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::{error, info};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use syncopate_core::{Config, ProviderRegistry, Syncopate};
use syncopate_impls::{JsonFileStore, YouTubeProvider};

use crate::context::ServerContext;

mod context;
mod docs;
mod errors;
mod gateway;
mod logging;
mod rooms;
mod schemas;
mod serialized;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9320;

pub type Router = axum::Router<ServerContext>;

#[derive(Debug, Error)]
enum StartupError {
    #[error("SYNCOPATE_PORT is not a valid port: {0}")]
    InvalidPort(String),
    #[error("Could not bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    #[error("Server stopped unexpectedly: {0}")]
    Serve(std::io::Error),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            Self::InvalidPort(_) => {
                "Set SYNCOPATE_PORT to a value between 1 and 65535, or unset it to use the default."
                    .to_string()
            }
            Self::Bind(..) => "Another process may already be listening on this port.".to_string(),
            Self::Serve(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    if let Err(error) = run().await {
        error!("Syncopate failed to start!");
        error!("{}", error);
        error!("Hint: {}", error.hint());
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let port = match env::var("SYNCOPATE_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .map_err(|_| StartupError::InvalidPort(value))?,
        Err(_) => DEFAULT_PORT,
    };

    let data_dir = env::var("SYNCOPATE_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let persistence_enabled = env::var("SYNCOPATE_PERSISTENCE")
        .map(|value| value != "off")
        .unwrap_or(true);

    // Components are built eagerly in dependency order, so configuration
    // problems surface at startup rather than on first use
    let providers = ProviderRegistry::new();
    providers.register(YouTubeProvider::new());

    let store = JsonFileStore::new(data_dir);
    let config = Config {
        persistence_enabled,
        ..Default::default()
    };

    let syncopate = Arc::new(Syncopate::new(config, providers, store));
    info!("Initialized successfully.");

    let context = ServerContext { syncopate };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = axum::Router::new()
        .nest("/v1/rooms", rooms::router().merge(gateway::router()))
        .route("/api.json", get(docs::serve_api))
        .layer(cors)
        .with_state(context);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| StartupError::Bind(addr, e))?;

    info!("Listening on port {}", port);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(StartupError::Serve)
}
