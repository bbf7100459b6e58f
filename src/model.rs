//! Data models for the movie reviews API
//!
//! This module defines the documents served by the API, the identifier type
//! used by the document store, and the typed request/response structures the
//! handlers work with.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use chrono::Utc;
use rand::Rng;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// A schemaless JSON document as stored in a collection
///
/// Movies and reviews are opaque: apart from `_id`, `title`, `rated` and
/// `movie_id`, every field is passed through untouched.
pub type Document = Map<String, Value>;

/// Page number used when the request does not specify one
pub const DEFAULT_PAGE: usize = 0;

/// Page size used when the request does not specify one
pub const DEFAULT_MOVIES_PER_PAGE: usize = 20;

/// Error returned when a string is not a valid [`ObjectId`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid id {0:?}: must be a string of 24 hex characters")]
pub struct InvalidObjectId(pub String);

/// 12-byte document identifier, rendered as 24 lowercase hex characters
///
/// Layout: 4-byte big-endian creation timestamp (seconds), 5 bytes unique to
/// the process, 3-byte counter. Ids created by one process sort by creation
/// time, which gives collections a stable natural order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    /// Generates a fresh id
    pub fn new() -> Self {
        let timestamp = Utc::now().timestamp() as u32;
        let process = PROCESS_UNIQUE.get_or_init(|| rand::rng().random());
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::rng().random_range(0..0x00ff_ffff)))
            .fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Seconds since the epoch at which the id was generated
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidObjectId(s.to_string()));
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidObjectId(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Selector narrowing the movie set
///
/// At most one criterion is ever active. Serializes to `{}`,
/// `{"title": ..}` or `{"rated": ..}` for the response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MovieFilter {
    #[default]
    None,
    /// Text search over the title index
    ByTitle(String),
    /// Exact match on the `rated` field
    ByRating(String),
}

impl MovieFilter {
    /// Builds a filter from the raw request values
    ///
    /// Empty strings count as absent. When both are given, `rated` wins.
    pub fn from_params(rated: Option<&str>, title: Option<&str>) -> Self {
        match (non_empty(rated), non_empty(title)) {
            (Some(rated), _) => MovieFilter::ByRating(rated.to_string()),
            (None, Some(title)) => MovieFilter::ByTitle(title.to_string()),
            (None, None) => MovieFilter::None,
        }
    }
}

impl Serialize for MovieFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MovieFilter::None => serializer.serialize_map(Some(0))?.end(),
            MovieFilter::ByTitle(title) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("title", title)?;
                map.end()
            }
            MovieFilter::ByRating(rated) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("rated", rated)?;
                map.end()
            }
        }
    }
}

/// Pagination bounds for the list operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page number
    pub page: usize,
    /// Page size, always at least 1
    pub per_page: usize,
}

impl PageRequest {
    /// Creates a page request; a zero page size falls back to the default
    pub fn new(page: usize, per_page: usize) -> Self {
        let per_page = if per_page == 0 {
            DEFAULT_MOVIES_PER_PAGE
        } else {
            per_page
        };
        Self { page, per_page }
    }

    /// Number of documents to skip before this page starts
    pub fn skip(&self) -> usize {
        self.per_page.saturating_mul(self.page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_MOVIES_PER_PAGE)
    }
}

/// One page of movies plus the size of the whole filtered set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoviesPage {
    pub items: Vec<Document>,
    /// Count of every matching movie, independent of pagination
    pub total_count: u64,
}

/// Query parameters for listing movies
///
/// All values arrive untyped; [`ListParams::page_request`] parses the numbers
/// and falls back to the defaults instead of failing.
///
/// # Example
/// Query string: `?rated=PG-13&page=2&moviesPerPage=10`
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub rated: Option<String>,
    pub title: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "moviesPerPage")]
    pub movies_per_page: Option<String>,
}

impl ListParams {
    pub fn filter(&self) -> MovieFilter {
        MovieFilter::from_params(self.rated.as_deref(), self.title.as_deref())
    }

    /// Resolves pagination, clamping the page size to `max_per_page` if set
    pub fn page_request(&self, max_per_page: Option<usize>) -> PageRequest {
        let page = non_empty(self.page.as_deref())
            .and_then(|p| p.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE);

        let mut per_page = non_empty(self.movies_per_page.as_deref())
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_MOVIES_PER_PAGE);

        if let Some(max) = max_per_page {
            per_page = per_page.min(max);
        }

        PageRequest::new(page, per_page)
    }
}

/// Envelope returned by `GET /api/v1/movies`
///
/// # Example
/// ```json
/// {
///   "movies": [...],
///   "page": 0,
///   "filters": {"rated": "PG"},
///   "entries_per_page": 20,
///   "total_results": 25
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct MoviesResponse {
    pub movies: Vec<Document>,
    pub page: usize,
    pub filters: MovieFilter,
    pub entries_per_page: usize,
    pub total_results: u64,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
