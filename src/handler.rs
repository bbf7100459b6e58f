//! HTTP request handlers for the movie reviews API
//!
//! Handlers parse the untyped request into typed values, delegate to
//! [`MoviesDao`] and shape the JSON response:
//! - Listing movies with pagination and an optional filter
//! - Fetching a single movie together with its reviews
//! - Listing the distinct ratings

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use tracing::{debug, error};

use crate::dao::MoviesDao;
use crate::error::ApiError;
use crate::model::{Document, ListParams, MoviesResponse};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Connected data-access layer
    pub movies: Arc<MoviesDao>,

    /// Upper bound applied to `moviesPerPage`, if any
    pub max_movies_per_page: Option<usize>,
}

impl AppState {
    pub fn new(movies: Arc<MoviesDao>) -> Self {
        Self {
            movies,
            max_movies_per_page: None,
        }
    }
}

/// Lists movies with pagination and an optional filter
///
/// # Query Parameters
///
/// - `rated` (optional) - Exact rating, e.g. `PG-13`; wins over `title`
/// - `title` (optional) - Text search over movie titles
/// - `page` (optional) - Zero-based page number (default: 0)
/// - `moviesPerPage` (optional) - Page size (default: 20)
///
/// Unparseable numbers fall back to their defaults.
///
/// # Example Request
///
/// `GET /api/v1/movies?rated=PG&page=1&moviesPerPage=20`
///
/// # Response
///
/// Always **200 OK**; store failures surface as an empty page.
///
/// ```json
/// {
///   "movies": [...],
///   "page": 1,
///   "filters": {"rated": "PG"},
///   "entries_per_page": 20,
///   "total_results": 25
/// }
/// ```
pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<MoviesResponse> {
    let filters = params.filter();
    let page = params.page_request(state.max_movies_per_page);

    let result = state.movies.list_movies(&filters, page);
    debug!(
        "listed {} of {} movies (page {}, {} per page, filters {:?})",
        result.items.len(),
        result.total_count,
        page.page,
        page.per_page,
        filters
    );

    Json(MoviesResponse {
        movies: result.items,
        page: page.page,
        filters,
        entries_per_page: page.per_page,
        total_results: result.total_count,
    })
}

/// Fetches one movie with its reviews embedded under `reviews`
///
/// # Path Parameters
///
/// - `id` - 24-character hex movie id
///
/// # Response
///
/// - **200 OK** - The movie document with a `reviews` array
/// - **404 Not Found** - `{"error": "not found"}`
/// - **500 Internal Server Error** - Malformed id or store failure
pub async fn get_movie_by_id(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Document>, ApiError> {
    match state.movies.get_movie_by_id(&id) {
        Ok(Some(movie)) => Ok(Json(movie)),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => {
            error!("api, {}", e);
            Err(e.into())
        }
    }
}

/// Lists the distinct `rated` values across all movies
///
/// Store failures surface as an empty array.
pub async fn get_ratings(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.movies.get_ratings())
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
