//! Embedded document store
//!
//! Documents live in an embedded redb database. A single database file holds
//! several logical databases (namespaces); each collection of a namespace is
//! its own table:
//!
//! - Table name: `"{namespace}.{collection}"`, e.g. `"sample_mflix.movies"`
//! - Key: the document's `_id` as a hex string
//! - Value: the JSON-serialized document
//!
//! Because `_id`s embed their creation time, key order doubles as the
//! collection's natural (insertion) order.

use std::ops::ControlFlow;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use serde_json::Value;
use thiserror::Error;

use crate::model::{Document, ObjectId};
use crate::query::{field_value, Lookup, Query, Stage};

/// Errors raised by the document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("malformed document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("duplicate key {key:?} in collection {collection}")]
    DuplicateKey { collection: String, key: String },
}

impl StoreError {
    /// True when the error only says the collection was never created
    pub fn is_missing_collection(&self) -> bool {
        matches!(self, StoreError::Table(redb::TableError::TableDoesNotExist(_)))
    }
}

/// Handle to the store file, shared across the process
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Database>,
}

impl DocumentStore {
    /// Creates or opens the store file at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - File path where the store lives (e.g., "data.db")
    ///
    /// # Returns
    ///
    /// * `Ok(DocumentStore)` - Shareable handle to the opened file
    /// * `Err(StoreError::Database)` - The file could not be created or opened
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use movie_reviews::database::DocumentStore;
    /// let store = DocumentStore::open("data.db").expect("Failed to open store");
    /// let movies = store.database("sample_mflix").collection("movies");
    /// ```
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Selects a logical database; this never touches the file
    pub fn database(&self, name: &str) -> Namespace {
        Namespace {
            db: self.db.clone(),
            name: name.to_string(),
        }
    }
}

/// A logical database inside the store
#[derive(Clone)]
pub struct Namespace {
    db: Arc<Database>,
    name: String,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates the collection if it does not exist yet
    ///
    /// # Arguments
    ///
    /// * `name` - Collection name inside this namespace (e.g., "movies")
    pub fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        let collection = self.handle(name);

        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(collection.definition())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    /// Resolves a handle to an existing collection
    ///
    /// # Arguments
    ///
    /// * `name` - Collection name inside this namespace
    ///
    /// # Returns
    ///
    /// * `Ok(Collection)` - Handle usable for the lifetime of the store
    /// * `Err(StoreError::Table)` - The collection was never created
    ///   (see [`StoreError::is_missing_collection`])
    pub fn collection(&self, name: &str) -> Result<Collection, StoreError> {
        let collection = self.handle(name);

        let read_txn = self.db.begin_read()?;
        read_txn.open_table(collection.definition())?;

        Ok(collection)
    }

    /// Inserts into several collections within one write transaction
    ///
    /// Either every batch is committed or none is. Missing collections are
    /// created as part of the same transaction.
    ///
    /// # Arguments
    ///
    /// * `batches` - `(collection name, documents)` pairs, written in order
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Vec<String>>)` - Inserted keys, one list per batch
    /// * `Err(StoreError)` - Nothing was written
    pub fn insert_many(
        &self,
        batches: Vec<(&str, Vec<Document>)>,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        let write_txn = self.db.begin_write()?;
        let mut keys = Vec::with_capacity(batches.len());
        for (name, docs) in batches {
            let collection = self.handle(name);
            let mut table = write_txn.open_table(collection.definition())?;
            keys.push(insert_into(&mut table, &collection.table, docs)?);
        }
        write_txn.commit()?;

        Ok(keys)
    }

    fn handle(&self, name: &str) -> Collection {
        Collection {
            db: self.db.clone(),
            namespace: self.name.clone(),
            name: name.to_string(),
            table: format!("{}.{}", self.name, name),
        }
    }
}

/// Handle to one collection; cheap to clone
#[derive(Clone)]
pub struct Collection {
    db: Arc<Database>,
    namespace: String,
    name: String,
    table: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns matching documents in natural order
    ///
    /// # Arguments
    ///
    /// * `query` - Filter every returned document satisfies
    /// * `skip` - Number of matches to pass over first
    /// * `limit` - Maximum number of documents; 0 means no limit
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Document>)` - At most `limit` matches, in key order
    /// * `Err(StoreError)` - The collection could not be read
    pub fn find(&self, query: &Query, skip: usize, limit: usize) -> Result<Vec<Document>, StoreError> {
        let limit = if limit == 0 { usize::MAX } else { limit };
        let mut skipped = 0;
        let mut results = Vec::new();

        self.for_each_match(query, |doc| {
            if skipped < skip {
                skipped += 1;
                return ControlFlow::Continue(());
            }
            results.push(doc);
            if results.len() >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        Ok(results)
    }

    /// Counts every matching document, ignoring pagination
    ///
    /// # Arguments
    ///
    /// * `query` - The same filter passed to [`Collection::find`]
    pub fn count_documents(&self, query: &Query) -> Result<u64, StoreError> {
        let mut count = 0;
        self.for_each_match(query, |_| {
            count += 1;
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }

    /// Unique values of `field` across the collection, in first-seen order
    ///
    /// Array values contribute their elements; documents without the field
    /// are skipped.
    pub fn distinct(&self, field: &str) -> Result<Vec<Value>, StoreError> {
        let mut values: Vec<Value> = Vec::new();
        let mut add = |value: &Value| {
            if !values.contains(value) {
                values.push(value.clone());
            }
        };

        self.for_each_match(&Query::All, |doc| {
            match field_value(&doc, field) {
                Some(Value::Array(items)) => items.iter().for_each(&mut add),
                Some(value) => add(value),
                None => {}
            }
            ControlFlow::Continue(())
        })?;

        Ok(values)
    }

    /// Runs an aggregation pipeline over the collection
    ///
    /// A leading `Match` is used to select the input set, so an `_id`
    /// equality match becomes a single point lookup.
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Stages applied in order
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Document>)` - Output of the last stage
    /// * `Err(StoreError)` - Reading this or a joined collection failed
    pub fn aggregate(&self, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        let (mut docs, rest) = match pipeline.split_first() {
            Some((Stage::Match(query), rest)) => (self.find(query, 0, 0)?, rest),
            _ => (self.find(&Query::All, 0, 0)?, pipeline),
        };

        for stage in rest {
            match stage {
                Stage::Match(query) => docs.retain(|doc| query.matches(doc)),
                Stage::Lookup(lookup) => self.lookup(&mut docs, lookup)?,
            }
        }

        Ok(docs)
    }

    /// Inserts documents, assigning an `_id` to those without one
    ///
    /// String `_id`s that are valid ObjectIds are stored in their canonical
    /// lowercase form, so lookups by a parsed id always find them.
    ///
    /// # Arguments
    ///
    /// * `docs` - Documents to insert, in order
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - The keys of the inserted documents
    /// * `Err(StoreError::DuplicateKey)` - An `_id` is already taken; nothing
    ///   is written
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<String>, StoreError> {
        let write_txn = self.db.begin_write()?;
        let keys = {
            let mut table = write_txn.open_table(self.definition())?;
            insert_into(&mut table, &self.table, docs)?
        };
        write_txn.commit()?;

        Ok(keys)
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static str> {
        TableDefinition::new(&self.table)
    }

    fn sibling(&self, name: &str) -> Collection {
        Collection {
            db: self.db.clone(),
            namespace: self.namespace.clone(),
            name: name.to_string(),
            table: format!("{}.{}", self.namespace, name),
        }
    }

    fn for_each_match<F>(&self, query: &Query, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(Document) -> ControlFlow<()>,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.definition())?;

        if let Some(key) = query.id_lookup() {
            if let Some(value) = table.get(key)? {
                let doc: Document = serde_json::from_str(value.value())?;
                if query.matches(&doc) {
                    let _ = visit(doc);
                }
            }
            return Ok(());
        }

        for entry in table.iter()? {
            let (_, value) = entry?;
            let doc: Document = serde_json::from_str(value.value())?;
            if query.matches(&doc) && visit(doc).is_break() {
                break;
            }
        }

        Ok(())
    }

    fn lookup(&self, docs: &mut [Document], lookup: &Lookup) -> Result<(), StoreError> {
        let foreign = self.sibling(&lookup.from);

        for doc in docs.iter_mut() {
            let local = join_key(field_value(doc, &lookup.local_field));
            let mut joined = Vec::new();

            let scan = foreign.for_each_match(&Query::All, |other| {
                if join_key(field_value(&other, &lookup.foreign_field)) == local {
                    joined.push(Value::Object(other));
                }
                ControlFlow::Continue(())
            });
            match scan {
                Ok(()) => {}
                // Joining against a collection that was never created yields nothing
                Err(e) if e.is_missing_collection() => {}
                Err(e) => return Err(e),
            }

            doc.insert(lookup.as_field.clone(), Value::Array(joined));
        }

        Ok(())
    }
}

/// Writes `docs` into an open table, normalising or assigning `_id`s
fn insert_into(
    table: &mut Table<'_, &'static str, &'static str>,
    table_name: &str,
    docs: Vec<Document>,
) -> Result<Vec<String>, StoreError> {
    let mut keys = Vec::with_capacity(docs.len());

    for mut doc in docs {
        let key = match doc.get("_id") {
            Some(Value::String(id)) => match id.parse::<ObjectId>() {
                Ok(oid) => oid.to_hex(),
                Err(_) => id.clone(),
            },
            Some(other) => other.to_string(),
            None => ObjectId::new().to_hex(),
        };
        if doc.get("_id").map_or(true, Value::is_string) {
            doc.insert("_id".to_string(), Value::String(key.clone()));
        }

        if table.get(key.as_str())?.is_some() {
            return Err(StoreError::DuplicateKey {
                collection: table_name.to_string(),
                key,
            });
        }

        let json = serde_json::to_string(&doc)?;
        table.insert(key.as_str(), json.as_str())?;
        keys.push(key);
    }

    Ok(keys)
}

/// Value compared by joins: ObjectId strings compare case-insensitively,
/// a missing field compares as null
fn join_key(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(s)) => match s.parse::<ObjectId>() {
            Ok(oid) => Value::String(oid.to_hex()),
            Err(_) => Value::String(s.clone()),
        },
        Some(other) => other.clone(),
        None => Value::Null,
    }
}
