//! Route definitions for the movie reviews API
//!
//! This module configures all HTTP routes and maps them to their respective handlers.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handler::{get_movie_by_id, get_ratings, list_movies, not_found, AppState};

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /api/v1/movies` - Lists movies with pagination and filtering
/// - `GET /api/v1/movies/id/{id}` - Fetches one movie with its reviews
/// - `GET /api/v1/movies/ratings` - Lists the distinct ratings
///
/// Any other path answers 404 `{"error": "not found"}`.
///
/// # Arguments
///
/// * `state` - Application state holding the connected `MoviesDao`
///
/// # Returns
///
/// Configured Axum Router ready to handle requests
///
/// # Example Usage
///
/// ```no_run
/// # use std::sync::Arc;
/// # use movie_reviews::dao::MoviesDao;
/// # use movie_reviews::database::DocumentStore;
/// # use movie_reviews::handler::AppState;
/// # use movie_reviews::route::create_app;
/// # let store = DocumentStore::open("data.db").unwrap();
/// let dao = MoviesDao::new();
/// dao.connect(&store, "sample_mflix");
/// let app = create_app(AppState::new(Arc::new(dao)));
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/movies", get(list_movies))
        .route("/api/v1/movies/id/{id}", get(get_movie_by_id))
        .route("/api/v1/movies/ratings", get(get_ratings))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
