//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Opens the document store and optionally seeds it
//! - Connects the data-access layer
//! - Starts the HTTP server with graceful shutdown support

use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use movie_reviews::config::Config;
use movie_reviews::dao::{MoviesDao, MOVIES_COLLECTION, REVIEWS_COLLECTION};
use movie_reviews::database::DocumentStore;
use movie_reviews::handler::AppState;
use movie_reviews::route::create_app;
use movie_reviews::seed::load_seed_file;

/// Application entry point
///
/// Startup order matters: the DAO is connected before the listener is
/// bound, so no request can observe an unconnected collection handle.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("movie_reviews=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();

    let store = DocumentStore::open(&config.database_url)?;
    let ns = store.database(&config.namespace);
    ns.create_collection(MOVIES_COLLECTION)?;
    ns.create_collection(REVIEWS_COLLECTION)?;

    if let Some(seed_file) = &config.seed_file {
        load_seed_file(&ns, seed_file)?;
    }

    let movies = MoviesDao::new();
    movies.connect(&store, &config.namespace);

    let state = AppState {
        movies: Arc::new(movies),
        max_movies_per_page: config.max_movies_per_page,
    };

    let app = create_app(state).layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the specified port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running at http://localhost:{}", config.port);
    info!("Using database {} (namespace {})", config.database_url, config.namespace);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves once SIGINT (Ctrl+C) or, on Unix, SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
