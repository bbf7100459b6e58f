//! Startup data loading
//!
//! Fills an empty namespace from a JSON file of the form:
//!
//! ```json
//! {
//!   "movies":  [{"_id": "573a1390f29313caabcd4135", "title": "Blacksmith Scene", "rated": "UNRATED"}],
//!   "reviews": [{"movie_id": "573a1390f29313caabcd4135", "name": "beth", "review": "classic"}]
//! }
//! ```
//!
//! Documents without `_id` get a fresh one.

use std::fs;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::dao::{MOVIES_COLLECTION, REVIEWS_COLLECTION};
use crate::database::{Namespace, StoreError};
use crate::model::Document;
use crate::query::Query;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("unable to read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub movies: Vec<Document>,
    #[serde(default)]
    pub reviews: Vec<Document>,
}

/// Number of documents inserted per collection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub movies: usize,
    pub reviews: usize,
}

/// Loads `path` into `ns` unless its movies collection already has data
///
/// Both collections are created if needed.
pub fn load_seed_file(ns: &Namespace, path: &str) -> Result<SeedSummary, SeedError> {
    let raw = fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_string(),
        source,
    })?;
    let data: SeedData = serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path.to_string(),
        source,
    })?;

    seed(ns, data)
}

/// Inserts `data` into `ns` in a single transaction
///
/// A failure leaves both collections as they were, so a later start can
/// retry the whole seed.
///
/// # Arguments
///
/// * `ns` - Namespace receiving the `movies` and `reviews` collections
/// * `data` - Parsed seed documents
///
/// # Returns
///
/// * `Ok(SeedSummary)` - Documents inserted per collection (zero if skipped)
/// * `Err(SeedError::Store)` - Nothing was inserted
pub fn seed(ns: &Namespace, data: SeedData) -> Result<SeedSummary, SeedError> {
    ns.create_collection(MOVIES_COLLECTION)?;
    ns.create_collection(REVIEWS_COLLECTION)?;

    let movies = ns.collection(MOVIES_COLLECTION)?;
    if movies.count_documents(&Query::All)? > 0 {
        info!("{}.{} already has data, skipping seed", ns.name(), MOVIES_COLLECTION);
        return Ok(SeedSummary::default());
    }

    let keys = ns.insert_many(vec![
        (MOVIES_COLLECTION, data.movies),
        (REVIEWS_COLLECTION, data.reviews),
    ])?;
    let summary = SeedSummary {
        movies: keys[0].len(),
        reviews: keys[1].len(),
    };

    info!(
        "seeded {} movies and {} reviews into {}",
        summary.movies,
        summary.reviews,
        ns.name()
    );
    Ok(summary)
}
