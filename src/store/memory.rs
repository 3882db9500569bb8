use std::collections::{BTreeMap, HashMap};

use log::debug;
use rocket::tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::{missing, Batch, Collection, Document, Filter, Store, Update, Write};

type Tables = HashMap<Collection, BTreeMap<String, Document>>;

/// A store held entirely in process memory. Nothing survives a restart.
///
/// Used by the test suite and for throwaway demo servers.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply a single write to the tables.
fn apply(tables: &mut Tables, write: Write) -> Result<()> {
    match write {
        Write::Insert {
            collection,
            key,
            doc,
        } => {
            let table = tables.entry(collection).or_default();
            if table.contains_key(&key) {
                return Err(Error::DuplicateKey {
                    collection: collection.name(),
                    key,
                });
            }
            table.insert(key, doc);
        }
        Write::Set {
            collection,
            key,
            doc,
        } => {
            tables.entry(collection).or_default().insert(key, doc);
        }
        Write::Update {
            collection,
            key,
            update,
        } => {
            let doc = tables
                .get_mut(&collection)
                .and_then(|table| table.get_mut(&key))
                .ok_or_else(|| missing(collection, &key))?;
            update.apply(doc);
        }
        Write::Delete { collection, key } => {
            if let Some(table) = tables.get_mut(&collection) {
                table.remove(&key);
            }
        }
    }
    Ok(())
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .and_then(|table| table.get(key))
            .cloned())
    }

    async fn set(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        let mut tables = self.tables.write().await;
        apply(
            &mut tables,
            Write::Set {
                collection,
                key: key.to_string(),
                doc,
            },
        )
    }

    async fn insert(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        let mut tables = self.tables.write().await;
        apply(
            &mut tables,
            Write::Insert {
                collection,
                key: key.to_string(),
                doc,
            },
        )
    }

    async fn update(&self, collection: Collection, key: &str, update: Update) -> Result<()> {
        let mut tables = self.tables.write().await;
        apply(
            &mut tables,
            Write::Update {
                collection,
                key: key.to_string(),
                update,
            },
        )
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        apply(
            &mut tables,
            Write::Delete {
                collection,
                key: key.to_string(),
            },
        )
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .map(|table| {
                table
                    .values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, batch: Batch) -> Result<()> {
        debug!("Committing batch of {} writes", batch.len());
        let mut tables = self.tables.write().await;
        // Work on a copy so a failing write leaves the original untouched.
        let mut staged = tables.clone();
        for write in batch {
            apply(&mut staged, write)?;
        }
        *tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[rocket::async_test]
    async fn insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .insert(Collection::Users, "V1", doc(json!({"name": "first"})))
            .await
            .unwrap();
        let result = store
            .insert(Collection::Users, "V1", doc(json!({"name": "second"})))
            .await;
        assert!(matches!(result, Err(Error::DuplicateKey { .. })));

        let stored = store.get(Collection::Users, "V1").await.unwrap().unwrap();
        assert_eq!(stored, doc(json!({"name": "first"})));
    }

    #[rocket::async_test]
    async fn update_missing_record_fails() {
        let store = MemoryStore::new();
        let result = store
            .update(Collection::Users, "NOBODY", Update::new().set("hasVoted", true))
            .await;
        assert_eq!(
            result.unwrap_err().status(),
            rocket::http::Status::NotFound
        );
    }

    #[rocket::async_test]
    async fn failed_batch_changes_nothing() {
        let store = MemoryStore::new();
        store
            .set(Collection::Users, "A", doc(json!({"n": 1})))
            .await
            .unwrap();
        store
            .set(Collection::Users, "B", doc(json!({"n": 2})))
            .await
            .unwrap();

        let mut batch = Batch::new();
        batch.update(Collection::Users, "A", Update::new().set("n", 10));
        batch.delete(Collection::Users, "B");
        batch.insert(Collection::Users, "A", doc(json!({"n": 0})));
        assert!(store.commit(batch).await.is_err());

        let a = store.get(Collection::Users, "A").await.unwrap().unwrap();
        assert_eq!(a, doc(json!({"n": 1})));
        assert!(store.get(Collection::Users, "B").await.unwrap().is_some());
    }

    #[rocket::async_test]
    async fn query_filters_in_key_order() {
        let store = MemoryStore::new();
        for (key, role) in [("C2", "contestant"), ("V1", "voter"), ("C1", "contestant")] {
            store
                .set(Collection::Users, key, doc(json!({"regNum": key, "role": role})))
                .await
                .unwrap();
        }
        let contestants = store
            .query(Collection::Users, &Filter::all().eq("role", "contestant"))
            .await
            .unwrap();
        let keys: Vec<_> = contestants
            .iter()
            .map(|doc| doc["regNum"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["C1", "C2"]);
    }
}
