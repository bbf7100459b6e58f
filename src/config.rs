//! Runtime configuration read from the environment
//!
//! # Environment Variables
//!
//! - `PORT` - Server port number (default: 8080)
//! - `DATABASE_URL` - Path to the store file (default: "data.db")
//! - `MOVIEREVIEWS_NS` - Logical database holding `movies` and `reviews`
//!   (default: "sample_mflix")
//! - `SEED_FILE` - Optional JSON file loaded into an empty store at startup
//! - `MAX_MOVIES_PER_PAGE` - Optional cap on `moviesPerPage`

use std::env;

use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "data.db";
pub const DEFAULT_NAMESPACE: &str = "sample_mflix";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub namespace: String,
    pub seed_file: Option<String>,
    pub max_movies_per_page: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            seed_file: None,
            max_movies_per_page: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    ///
    /// Empty values count as unset; values that fail to parse fall back to
    /// the default with a warning.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("invalid PORT {:?}, using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => defaults.port,
        };

        let max_movies_per_page = var("MAX_MOVIES_PER_PAGE").and_then(|raw| {
            match raw.trim().parse::<usize>() {
                Ok(max) if max > 0 => Some(max),
                _ => {
                    warn!("invalid MAX_MOVIES_PER_PAGE {:?}, page size is uncapped", raw);
                    None
                }
            }
        });

        Self {
            port,
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            namespace: var("MOVIEREVIEWS_NS").unwrap_or(defaults.namespace),
            seed_file: var("SEED_FILE"),
            max_movies_per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let cfg = config(&[
            ("PORT", "5000"),
            ("DATABASE_URL", "/tmp/movies.db"),
            ("MOVIEREVIEWS_NS", "reviews_prod"),
            ("SEED_FILE", "seed.json"),
            ("MAX_MOVIES_PER_PAGE", "100"),
        ]);
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.database_url, "/tmp/movies.db");
        assert_eq!(cfg.namespace, "reviews_prod");
        assert_eq!(cfg.seed_file.as_deref(), Some("seed.json"));
        assert_eq!(cfg.max_movies_per_page, Some(100));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[("PORT", "http"), ("MAX_MOVIES_PER_PAGE", "0"), ("MOVIEREVIEWS_NS", "")]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.max_movies_per_page, None);
        assert_eq!(cfg.namespace, DEFAULT_NAMESPACE);
    }
}
