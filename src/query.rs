//! Query descriptions understood by the document store
//!
//! The data-access layer never touches storage directly: it describes what it
//! wants as a [`Query`] (for `find`/`count_documents`) or a pipeline of
//! [`Stage`]s (for `aggregate`), and the store evaluates them.

use std::collections::HashSet;

use serde_json::Value;

use crate::model::Document;

/// Filter applied to each document of a collection
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every document
    All,
    /// Full-text search over a set of indexed string fields
    Text(TextSearch),
    /// Equality on a (possibly dotted) field path
    Eq { field: String, value: Value },
}

impl Query {
    pub fn text(fields: &[&str], search: &str) -> Self {
        Query::Text(TextSearch::parse(fields, search))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::All => true,
            Query::Text(search) => search.matches(doc),
            Query::Eq { field, value } => match field_value(doc, field) {
                Some(found) => {
                    found == value
                        || matches!(found, Value::Array(items) if items.contains(value))
                }
                None => value.is_null(),
            },
        }
    }

    /// Returns the key when this query selects a single document by `_id`
    pub fn id_lookup(&self) -> Option<&str> {
        match self {
            Query::Eq { field, value } if field == "_id" => value.as_str(),
            _ => None,
        }
    }
}

/// Parsed `$text`-style search
///
/// - bare words are OR-ed: any one of them must appear as a word
/// - `"quoted phrases"` must all appear (case-insensitive substring)
/// - `-word` excludes documents containing that word
///
/// A search with nothing positive in it matches no document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearch {
    fields: Vec<String>,
    terms: Vec<String>,
    phrases: Vec<String>,
    negated: Vec<String>,
}

impl TextSearch {
    pub fn parse(fields: &[&str], search: &str) -> Self {
        let mut terms = Vec::new();
        let mut phrases = Vec::new();
        let mut negated = Vec::new();

        // Odd segments sit between a pair of quotes
        for (i, segment) in search.split('"').enumerate() {
            if i % 2 == 1 {
                let phrase = segment.trim().to_lowercase();
                if !phrase.is_empty() {
                    phrases.push(phrase);
                }
                continue;
            }

            for token in segment.split_whitespace() {
                match token.strip_prefix('-') {
                    Some(rest) => negated.extend(tokenize(rest)),
                    None => terms.extend(tokenize(token)),
                }
            }
        }

        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            terms,
            phrases,
            negated,
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn negated(&self) -> &[String] {
        &self.negated
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if self.terms.is_empty() && self.phrases.is_empty() {
            return false;
        }

        let text = self.indexed_text(doc);
        let words: HashSet<String> = tokenize(&text).collect();

        if self.negated.iter().any(|t| words.contains(t)) {
            return false;
        }
        if !self.phrases.is_empty() {
            return self.phrases.iter().all(|p| text.contains(p.as_str()));
        }
        self.terms.iter().any(|t| words.contains(t))
    }

    /// Lowercased concatenation of every indexed string in the document
    fn indexed_text(&self, doc: &Document) -> String {
        let mut parts = Vec::new();
        for field in &self.fields {
            match field_value(doc, field) {
                Some(Value::String(s)) => parts.push(s.to_lowercase()),
                Some(Value::Array(items)) => parts.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_lowercase),
                ),
                _ => {}
            }
        }
        parts.join(" ")
    }
}

/// One step of an aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keeps documents matching the query
    Match(Query),
    /// Left outer join against a sibling collection
    Lookup(Lookup),
}

/// Equality join: attaches every `from` document whose `foreign_field`
/// equals this document's `local_field` as an array under `as_field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

/// Resolves a dotted path such as `imdb.rating`
pub fn field_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_match_all() {
        assert!(Query::All.matches(&doc(json!({}))));
    }

    #[test]
    fn test_eq_matches_scalars_and_arrays() {
        let movie = doc(json!({"rated": "PG-13", "genres": ["Drama", "War"], "imdb": {"rating": 8.1}}));

        assert!(Query::eq("rated", "PG-13").matches(&movie));
        assert!(!Query::eq("rated", "pg-13").matches(&movie));
        assert!(Query::eq("genres", "War").matches(&movie));
        assert!(Query::eq("imdb.rating", 8.1).matches(&movie));
        assert!(!Query::eq("imdb.votes", 10).matches(&movie));
    }

    #[test]
    fn test_eq_null_matches_missing_field() {
        let movie = doc(json!({"title": "Metropolis"}));
        assert!(Query::eq("rated", Value::Null).matches(&movie));
        assert!(!Query::eq("title", Value::Null).matches(&movie));
    }

    #[test]
    fn test_id_lookup() {
        assert_eq!(Query::eq("_id", "abc").id_lookup(), Some("abc"));
        assert_eq!(Query::eq("rated", "abc").id_lookup(), None);
        assert_eq!(Query::All.id_lookup(), None);
    }

    #[test]
    fn test_text_search_any_term() {
        let query = Query::text(&["title"], "inception matrix");
        assert!(query.matches(&doc(json!({"title": "Inception"}))));
        assert!(query.matches(&doc(json!({"title": "The Matrix Reloaded"}))));
        assert!(!query.matches(&doc(json!({"title": "Memento"}))));
        assert!(!query.matches(&doc(json!({"plot": "inception"}))));
    }

    #[test]
    fn test_text_search_matches_whole_words_only() {
        let query = Query::text(&["title"], "star");
        assert!(query.matches(&doc(json!({"title": "A Star Is Born"}))));
        assert!(!query.matches(&doc(json!({"title": "Stardust"}))));
    }

    #[test]
    fn test_text_search_phrases_and_negation() {
        let query = Query::text(&["title"], "\"the godfather\" -III");
        assert_eq!(query, Query::Text(TextSearch::parse(&["title"], "\"the godfather\" -III")));

        assert!(query.matches(&doc(json!({"title": "The Godfather"}))));
        assert!(query.matches(&doc(json!({"title": "The Godfather: Part II"}))));
        assert!(!query.matches(&doc(json!({"title": "The Godfather: Part III"}))));
        assert!(!query.matches(&doc(json!({"title": "Godfather"}))));
    }

    #[test]
    fn test_text_search_without_positive_terms_matches_nothing() {
        assert!(!Query::text(&["title"], "").matches(&doc(json!({"title": "Up"}))));
        assert!(!Query::text(&["title"], "-up").matches(&doc(json!({"title": "Jaws"}))));
        assert!(!Query::text(&["title"], "  !! ").matches(&doc(json!({"title": "!!"}))));
    }

    #[test]
    fn test_text_search_parse() {
        let search = TextSearch::parse(&["title"], "Blade-Runner \"final cut\" -2049");
        assert_eq!(search.terms(), ["blade", "runner"]);
        assert_eq!(search.phrases(), ["final cut"]);
        assert_eq!(search.negated(), ["2049"]);
    }

    #[test]
    fn test_field_value_paths() {
        let d = doc(json!({"a": {"b": {"c": 1}}, "x": 2}));
        assert_eq!(field_value(&d, "a.b.c"), Some(&json!(1)));
        assert_eq!(field_value(&d, "x"), Some(&json!(2)));
        assert_eq!(field_value(&d, "x.y"), None);
        assert_eq!(field_value(&d, "missing"), None);
    }
}
