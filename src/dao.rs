//! Data access for movies
//!
//! [`MoviesDao`] owns the handle to the `movies` collection and turns typed
//! requests into query descriptions for the document store.
//!
//! Two error policies coexist on purpose:
//! - list and ratings are *fail-soft*: failures are logged and an empty
//!   result is returned, so callers cannot tell "nothing matched" from
//!   "the store failed";
//! - get-by-id *propagates* failures to the caller.

use std::sync::OnceLock;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::database::{Collection, DocumentStore, StoreError};
use crate::model::{Document, InvalidObjectId, MovieFilter, MoviesPage, ObjectId, PageRequest};
use crate::query::{Lookup, Query, Stage};

pub const MOVIES_COLLECTION: &str = "movies";
pub const REVIEWS_COLLECTION: &str = "reviews";

/// Fields covered by the movies text index
const TEXT_INDEXED_FIELDS: &[&str] = &["title"];

#[derive(Debug, Error)]
pub enum DaoError {
    /// `connect` never succeeded
    #[error("movies collection is not connected")]
    Uninitialized,

    #[error(transparent)]
    InvalidId(#[from] InvalidObjectId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only access to the movies collection and its reviews
#[derive(Default)]
pub struct MoviesDao {
    movies: OnceLock<Collection>,
}

impl MoviesDao {
    /// Creates an unconnected DAO; call [`MoviesDao::connect`] before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the `movies` collection of `namespace`
    ///
    /// The first successful call wins; later calls are no-ops. On failure the
    /// error is logged and the DAO stays unconnected, so every later
    /// operation sees [`DaoError::Uninitialized`].
    ///
    /// # Arguments
    ///
    /// * `store` - Open document store
    /// * `namespace` - Logical database holding `movies` and `reviews`
    ///   (the `MOVIEREVIEWS_NS` setting)
    pub fn connect(&self, store: &DocumentStore, namespace: &str) {
        if self.movies.get().is_some() {
            debug!("MoviesDao already connected, ignoring connect({})", namespace);
            return;
        }

        match store.database(namespace).collection(MOVIES_COLLECTION) {
            Ok(collection) => {
                if self.movies.set(collection).is_ok() {
                    info!("MoviesDao connected to {}.{}", namespace, MOVIES_COLLECTION);
                }
            }
            Err(e) => error!("unable to connect in MoviesDao: {}", e),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.movies.get().is_some()
    }

    /// Namespace of the connected collection, if any
    pub fn namespace(&self) -> Option<&str> {
        self.movies.get().map(Collection::namespace)
    }

    /// Lists one page of movies plus the total count of the filtered set
    ///
    /// Fail-soft: any failure yields an empty page with a zero count.
    ///
    /// # Arguments
    ///
    /// * `filter` - Title search, exact rating, or nothing
    /// * `page` - Skips `page * per_page` movies and returns at most `per_page`
    ///
    /// # Returns
    ///
    /// The page's movies and the count of every movie matching `filter`
    pub fn list_movies(&self, filter: &MovieFilter, page: PageRequest) -> MoviesPage {
        fail_soft("list movies", self.query_movies(filter, page))
    }

    /// Fetches a movie with its reviews attached under `reviews`
    ///
    /// # Arguments
    ///
    /// * `id` - 24-character hex id, any letter case
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Document))` - The movie with a `reviews` array (possibly empty)
    /// * `Ok(None)` - No movie has this id
    /// * `Err(DaoError::InvalidId)` - `id` is not a valid ObjectId
    /// * `Err(DaoError::Uninitialized | DaoError::Store)` - The store is
    ///   unavailable
    pub fn get_movie_by_id(&self, id: &str) -> Result<Option<Document>, DaoError> {
        let result = self.lookup_movie(id);
        if let Err(e) = &result {
            error!("something went wrong in get_movie_by_id: {}", e);
        }
        result
    }

    /// Distinct `rated` values across all movies
    ///
    /// Fail-soft: any failure yields an empty list.
    ///
    /// # Returns
    ///
    /// Each rating once, in the order the store first sees it
    pub fn get_ratings(&self) -> Vec<Value> {
        fail_soft("get ratings", self.distinct_ratings())
    }

    fn movies(&self) -> Result<&Collection, DaoError> {
        self.movies.get().ok_or(DaoError::Uninitialized)
    }

    fn query_movies(&self, filter: &MovieFilter, page: PageRequest) -> Result<MoviesPage, DaoError> {
        let movies = self.movies()?;
        let query = movies_query(filter);

        let items = movies.find(&query, page.skip(), page.per_page)?;
        // Counted separately; may drift from `items` under concurrent writes
        let total_count = movies.count_documents(&query)?;

        Ok(MoviesPage { items, total_count })
    }

    fn lookup_movie(&self, id: &str) -> Result<Option<Document>, DaoError> {
        let movies = self.movies()?;
        let id: ObjectId = id.parse()?;

        // `_id` is the table key, so the pipeline yields at most one movie
        Ok(movies.aggregate(&movie_with_reviews(&id))?.into_iter().next())
    }

    fn distinct_ratings(&self) -> Result<Vec<Value>, DaoError> {
        Ok(self.movies()?.distinct("rated")?)
    }
}

/// Translates a filter into the query executed against `movies`
pub fn movies_query(filter: &MovieFilter) -> Query {
    match filter {
        MovieFilter::ByTitle(title) => Query::text(TEXT_INDEXED_FIELDS, title),
        MovieFilter::ByRating(rated) => Query::eq("rated", rated.as_str()),
        MovieFilter::None => Query::All,
    }
}

/// Pipeline matching one movie and left-joining its reviews
fn movie_with_reviews(id: &ObjectId) -> [Stage; 2] {
    [
        Stage::Match(Query::eq("_id", id.to_hex())),
        Stage::Lookup(Lookup {
            from: REVIEWS_COLLECTION.to_string(),
            local_field: "_id".to_string(),
            foreign_field: "movie_id".to_string(),
            as_field: "reviews".to_string(),
        }),
    ]
}

/// Logs the failure and substitutes the default value
fn fail_soft<T: Default>(operation: &str, result: Result<T, DaoError>) -> T {
    result.unwrap_or_else(|e| {
        error!("unable to {}: {}", operation, e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn setup_store() -> (DocumentStore, NamedTempFile) {
        let temp_db = NamedTempFile::new().expect("Failed to create temp file");
        let store = DocumentStore::open(temp_db.path().to_str().unwrap()).unwrap();
        let ns = store.database("test_ns");
        ns.create_collection(MOVIES_COLLECTION).unwrap();
        ns.create_collection(REVIEWS_COLLECTION).unwrap();
        (store, temp_db)
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn connected_dao(store: &DocumentStore) -> MoviesDao {
        let dao = MoviesDao::new();
        dao.connect(store, "test_ns");
        dao
    }

    #[test]
    fn test_movies_query_shapes() {
        assert_eq!(movies_query(&MovieFilter::None), Query::All);
        assert_eq!(
            movies_query(&MovieFilter::ByRating("PG-13".into())),
            Query::eq("rated", "PG-13")
        );
        assert_eq!(
            movies_query(&MovieFilter::ByTitle("Inception".into())),
            Query::text(&["title"], "Inception")
        );
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (store, _temp_db) = setup_store();
        store.database("other_ns").create_collection(MOVIES_COLLECTION).unwrap();

        let dao = connected_dao(&store);
        assert_eq!(dao.namespace(), Some("test_ns"));

        dao.connect(&store, "other_ns");
        assert_eq!(dao.namespace(), Some("test_ns"));
    }

    #[test]
    fn test_failed_connect_leaves_dao_uninitialized() {
        let (store, _temp_db) = setup_store();
        let dao = MoviesDao::new();
        dao.connect(&store, "missing_ns");
        assert!(!dao.is_connected());

        // Fail-soft paths degrade to empty results
        assert_eq!(dao.list_movies(&MovieFilter::None, PageRequest::default()), MoviesPage::default());
        assert!(dao.get_ratings().is_empty());

        // Get-by-id surfaces the failure
        let err = dao.get_movie_by_id("573a1390f29313caabcd4135").unwrap_err();
        assert!(matches!(err, DaoError::Uninitialized));

        // A later successful connect still works
        dao.connect(&store, "test_ns");
        assert!(dao.is_connected());
    }

    #[test]
    fn test_list_movies_paginates_and_counts() {
        let (store, _temp_db) = setup_store();
        let movies = store.database("test_ns").collection(MOVIES_COLLECTION).unwrap();
        let docs = (0..25)
            .map(|i| doc(json!({"_id": format!("{:024x}", i), "title": format!("Movie {}", i), "rated": "PG"})))
            .collect();
        movies.insert_many(docs).unwrap();

        let dao = connected_dao(&store);
        let page = dao.list_movies(&MovieFilter::None, PageRequest::new(1, 20));
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total_count, 25);
        assert_eq!(page.items[0]["title"], "Movie 20");

        let page = dao.list_movies(&MovieFilter::ByRating("R".into()), PageRequest::new(0, 20));
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn test_get_movie_by_id() {
        let (store, _temp_db) = setup_store();
        let ns = store.database("test_ns");
        let ids = ns
            .collection(MOVIES_COLLECTION)
            .unwrap()
            .insert_many(vec![doc(json!({"title": "Heat", "rated": "R"}))])
            .unwrap();
        ns.collection(REVIEWS_COLLECTION)
            .unwrap()
            .insert_many(vec![doc(json!({"movie_id": ids[0], "review": "tense"}))])
            .unwrap();

        let dao = connected_dao(&store);
        let movie = dao.get_movie_by_id(&ids[0]).unwrap().unwrap();
        assert_eq!(movie["title"], "Heat");
        assert_eq!(movie["reviews"][0]["review"], "tense");

        assert!(dao.get_movie_by_id("ffffffffffffffffffffffff").unwrap().is_none());

        let err = dao.get_movie_by_id("12345").unwrap_err();
        assert!(matches!(&err, DaoError::InvalidId(InvalidObjectId(input)) if input == "12345"));
    }

    #[test]
    fn test_get_movie_by_id_ignores_hex_case() {
        let (store, _temp_db) = setup_store();
        let ns = store.database("test_ns");
        ns.insert_many(vec![
            (MOVIES_COLLECTION, vec![doc(json!({"_id": "573A1390F29313CAABCD4135", "title": "Greed"}))]),
            (REVIEWS_COLLECTION, vec![doc(json!({"movie_id": "573a1390F29313cAABCD4135", "review": "long"}))]),
        ])
        .unwrap();

        let dao = connected_dao(&store);
        for id in ["573a1390f29313caabcd4135", "573A1390F29313CAABCD4135"] {
            let movie = dao.get_movie_by_id(id).unwrap().unwrap();
            assert_eq!(movie["_id"], "573a1390f29313caabcd4135");
            assert_eq!(movie["reviews"].as_array().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_get_ratings() {
        let (store, _temp_db) = setup_store();
        store
            .database("test_ns")
            .collection(MOVIES_COLLECTION)
            .unwrap()
            .insert_many(vec![
                doc(json!({"rated": "PG"})),
                doc(json!({"rated": "G"})),
                doc(json!({"rated": "PG"})),
            ])
            .unwrap();

        let dao = connected_dao(&store);
        let mut ratings = dao.get_ratings();
        ratings.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        assert_eq!(ratings, vec![json!("G"), json!("PG")]);
    }

    #[test]
    fn test_fail_soft_returns_default() {
        let value: Vec<Value> = fail_soft("test", Err(DaoError::Uninitialized));
        assert!(value.is_empty());
        assert_eq!(fail_soft("test", Ok::<u64, DaoError>(7)), 7);
    }
}
