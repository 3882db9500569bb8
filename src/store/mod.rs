//! The storage capability interface.
//!
//! Every backend (SQLite file, MongoDB, in-memory) implements [`Store`], a
//! small key/document contract: get, set, insert-if-absent, partial update
//! with field deletion, delete, equality query, and an atomic batch. All
//! domain logic is written against this trait, never against a backend.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use rocket::{
    request::{self, FromRequest, Request},
    State,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

mod memory;
mod mongo;
mod sqlite;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use sqlite::SqliteStore;

/// A record as held by a store: a flat JSON object.
pub type Document = Map<String, Value>;

/// The collections (tables) the application keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Settings];

    /// The collection or table name used by the backends.
    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Settings => "settings",
        }
    }
}

/// A change to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    Delete,
}

/// A partial update of a record, by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update(BTreeMap<String, FieldUpdate>);

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `field` with `value`.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0
            .insert(field.to_string(), FieldUpdate::Set(value.into()));
        self
    }

    /// Remove `field` from the record entirely.
    pub fn delete(mut self, field: &str) -> Self {
        self.0.insert(field.to_string(), FieldUpdate::Delete);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldUpdate)> {
        self.0.iter()
    }

    /// Apply this update to an in-memory document.
    pub fn apply(&self, doc: &mut Document) {
        for (field, change) in &self.0 {
            match change {
                FieldUpdate::Set(value) => {
                    doc.insert(field.clone(), value.clone());
                }
                FieldUpdate::Delete => {
                    doc.remove(field);
                }
            }
        }
    }
}

/// A conjunction of field equalities. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Additionally require `field == value`.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.push((field.to_string(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().map(|(field, value)| (field, value))
    }

    /// Does the given document satisfy this filter?
    /// A missing field only matches `null`.
    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, value)| doc.get(field).unwrap_or(&Value::Null) == value)
    }
}

/// One write within a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert {
        collection: Collection,
        key: String,
        doc: Document,
    },
    Set {
        collection: Collection,
        key: String,
        doc: Document,
    },
    Update {
        collection: Collection,
        key: String,
        update: Update,
    },
    Delete {
        collection: Collection,
        key: String,
    },
}

/// A list of writes that a store must apply atomically: all or nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch(Vec<Write>);

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Collection, key: impl Into<String>, doc: Document) {
        self.0.push(Write::Insert {
            collection,
            key: key.into(),
            doc,
        });
    }

    pub fn set(&mut self, collection: Collection, key: impl Into<String>, doc: Document) {
        self.0.push(Write::Set {
            collection,
            key: key.into(),
            doc,
        });
    }

    pub fn update(&mut self, collection: Collection, key: impl Into<String>, update: Update) {
        self.0.push(Write::Update {
            collection,
            key: key.into(),
            update,
        });
    }

    pub fn delete(&mut self, collection: Collection, key: impl Into<String>) {
        self.0.push(Write::Delete {
            collection,
            key: key.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl IntoIterator for Batch {
    type Item = Write;
    type IntoIter = std::vec::IntoIter<Write>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A persistent key/document store.
///
/// Single-record operations are atomic. Multi-record changes must go through
/// [`Store::commit`].
#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Fetch a record, or `None` if there is no record under `key`.
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>>;

    /// Create or overwrite the record under `key`.
    async fn set(&self, collection: Collection, key: &str, doc: Document) -> Result<()>;

    /// Create the record under `key`, failing with [`Error::DuplicateKey`]
    /// if one already exists.
    async fn insert(&self, collection: Collection, key: &str, doc: Document) -> Result<()>;

    /// Change selected fields of an existing record. Fails with a not-found
    /// error if there is no record under `key`.
    async fn update(&self, collection: Collection, key: &str, update: Update) -> Result<()>;

    /// Delete the record under `key`. Deleting a missing record succeeds.
    async fn delete(&self, collection: Collection, key: &str) -> Result<()>;

    /// All records matching `filter`, ordered by key.
    async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>>;

    /// Apply every write in `batch`, or none of them.
    async fn commit(&self, batch: Batch) -> Result<()>;
}

/// A type stored in a particular collection under a string key.
pub trait StoredRecord: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn key(&self) -> String;
}

/// Serialise a record into a store document.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(doc) => Ok(doc),
        other => Err(Error::internal(format!(
            "Record did not serialise to an object: {other}"
        ))),
    }
}

/// Deserialise a store document into a record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

pub(crate) fn missing(collection: Collection, key: &str) -> Error {
    Error::not_found(format!("{} '{}'", collection.name(), key))
}

/// A shareable handle on the application's store, with typed helpers.
///
/// This is placed into managed state at ignition and can be requested by any
/// endpoint as a guard.
#[derive(Clone)]
pub struct Storage(Arc<dyn Store>);

impl Storage {
    pub fn new(store: impl Store + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Fetch a typed record by key.
    pub async fn fetch<T: StoredRecord>(&self, key: &str) -> Result<Option<T>> {
        self.0
            .get(T::COLLECTION, key)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Fetch every typed record matching `filter`.
    pub async fn fetch_all<T: StoredRecord>(&self, filter: &Filter) -> Result<Vec<T>> {
        self.0
            .query(T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Insert a typed record, failing if its key is taken.
    pub async fn insert_record<T: StoredRecord>(&self, record: &T) -> Result<()> {
        self.0
            .insert(T::COLLECTION, &record.key(), to_document(record)?)
            .await
    }

    /// Create or overwrite a typed record.
    #[cfg(test)]
    pub async fn put_record<T: StoredRecord>(&self, record: &T) -> Result<()> {
        self.0
            .set(T::COLLECTION, &record.key(), to_document(record)?)
            .await
    }
}

impl Deref for Storage {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Lets a `&Storage` stand in wherever a `&dyn Store` is expected.
#[rocket::async_trait]
impl Store for Storage {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        self.0.get(collection, key).await
    }

    async fn set(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        self.0.set(collection, key, doc).await
    }

    async fn insert(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        self.0.insert(collection, key, doc).await
    }

    async fn update(&self, collection: Collection, key: &str, update: Update) -> Result<()> {
        self.0.update(collection, key, update).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        self.0.delete(collection, key).await
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        self.0.query(collection, filter).await
    }

    async fn commit(&self, batch: Batch) -> Result<()> {
        self.0.commit(batch).await
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Storage {
    type Error = ();

    /// Get the store handle from managed state.
    ///
    /// Panics iff the [`Storage`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let storage = req.guard::<&State<Storage>>().await.unwrap();
        request::Outcome::Success(storage.inner().clone())
    }
}
