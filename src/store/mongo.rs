use log::{debug, warn};
use mongodb::{
    bson::{doc, to_bson, Bson, Document as BsonDocument},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{FindOptions, ReplaceOptions},
    Client, ClientSession, Collection as MongoCollection, Database,
};
use rocket::futures::TryStreamExt;
use serde_json::Value;

use crate::error::{Error, Result};

use super::{missing, Batch, Collection, Document, Filter, Store, Update, Write};

/// For some reason, the mongodb crate doesn't provide error code constants.
const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error.
fn is_duplicate_key_error(err: &MongoError) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    false
}

/// A store backed by a hosted MongoDB deployment.
///
/// Records live in one MongoDB collection per [`Collection`], with the record
/// key as `_id`. Batches run as multi-document transactions, which need a
/// replica set or sharded cluster.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect to the deployment at `uri` and use the database `db_name`.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        Ok(Self { client, db })
    }

    fn coll(&self, collection: Collection) -> MongoCollection<BsonDocument> {
        self.db.collection(collection.name())
    }

    /// Drop the whole database. Used to clean up after tests.
    pub async fn drop_database(&self) -> Result<()> {
        self.db.drop(None).await?;
        Ok(())
    }
}

fn key_filter(key: &str) -> BsonDocument {
    doc! { "_id": key }
}

/// Convert a store document into BSON, keyed by `_id`.
fn to_bson_document(key: &str, doc: &Document) -> Result<BsonDocument> {
    let mut bson_doc = BsonDocument::new();
    bson_doc.insert("_id", key);
    for (field, value) in doc {
        bson_doc.insert(field.clone(), to_bson(value)?);
    }
    Ok(bson_doc)
}

/// Convert a BSON document back into a store document, dropping `_id`.
fn from_bson_document(mut bson_doc: BsonDocument) -> Result<Document> {
    bson_doc.remove("_id");
    match Bson::Document(bson_doc).into_relaxed_extjson() {
        Value::Object(doc) => Ok(doc),
        other => Err(Error::internal(format!(
            "Stored record is not an object: {other}"
        ))),
    }
}

/// Convert a partial update into `$set` / `$unset` operators.
fn to_update_document(update: &Update) -> Result<BsonDocument> {
    let mut set = BsonDocument::new();
    let mut unset = BsonDocument::new();
    for (field, change) in update.iter() {
        match change {
            super::FieldUpdate::Set(value) => {
                set.insert(field.clone(), to_bson(value)?);
            }
            super::FieldUpdate::Delete => {
                unset.insert(field.clone(), "");
            }
        }
    }
    let mut update_doc = BsonDocument::new();
    if !set.is_empty() {
        update_doc.insert("$set", set);
    }
    if !unset.is_empty() {
        update_doc.insert("$unset", unset);
    }
    Ok(update_doc)
}

fn to_filter_document(filter: &Filter) -> Result<BsonDocument> {
    let mut filter_doc = BsonDocument::new();
    for (field, value) in filter.iter() {
        filter_doc.insert(field.clone(), to_bson(value)?);
    }
    Ok(filter_doc)
}

impl MongoStore {
    /// Apply one write, either standalone or as part of a transaction.
    async fn write(&self, write: Write, session: Option<&mut ClientSession>) -> Result<()> {
        match write {
            Write::Insert {
                collection,
                key,
                doc,
            } => {
                let bson_doc = to_bson_document(&key, &doc)?;
                let coll = self.coll(collection);
                let result = match session {
                    Some(session) => coll.insert_one_with_session(bson_doc, None, session).await,
                    None => coll.insert_one(bson_doc, None).await,
                };
                result.map_err(|err| {
                    if is_duplicate_key_error(&err) {
                        Error::DuplicateKey {
                            collection: collection.name(),
                            key,
                        }
                    } else {
                        err.into()
                    }
                })?;
            }
            Write::Set {
                collection,
                key,
                doc,
            } => {
                let bson_doc = to_bson_document(&key, &doc)?;
                let options = ReplaceOptions::builder().upsert(true).build();
                let coll = self.coll(collection);
                match session {
                    Some(session) => {
                        coll.replace_one_with_session(key_filter(&key), bson_doc, options, session)
                            .await?
                    }
                    None => coll.replace_one(key_filter(&key), bson_doc, options).await?,
                };
            }
            Write::Update {
                collection,
                key,
                update,
            } => {
                let update_doc = to_update_document(&update)?;
                let coll = self.coll(collection);
                let result = if update_doc.is_empty() {
                    // Nothing to change, but the record must still exist.
                    let found = match session {
                        Some(session) => {
                            coll.find_one_with_session(key_filter(&key), None, session)
                                .await?
                        }
                        None => coll.find_one(key_filter(&key), None).await?,
                    };
                    found.map(|_| ())
                } else {
                    let result = match session {
                        Some(session) => {
                            coll.update_one_with_session(
                                key_filter(&key),
                                update_doc,
                                None,
                                session,
                            )
                            .await?
                        }
                        None => coll.update_one(key_filter(&key), update_doc, None).await?,
                    };
                    (result.matched_count == 1).then_some(())
                };
                result.ok_or_else(|| missing(collection, &key))?;
            }
            Write::Delete { collection, key } => {
                let coll = self.coll(collection);
                match session {
                    Some(session) => {
                        coll.delete_one_with_session(key_filter(&key), None, session)
                            .await?
                    }
                    None => coll.delete_one(key_filter(&key), None).await?,
                };
            }
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        self.coll(collection)
            .find_one(key_filter(key), None)
            .await?
            .map(from_bson_document)
            .transpose()
    }

    async fn set(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        let write = Write::Set {
            collection,
            key: key.to_string(),
            doc,
        };
        self.write(write, None).await
    }

    async fn insert(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        let write = Write::Insert {
            collection,
            key: key.to_string(),
            doc,
        };
        self.write(write, None).await
    }

    async fn update(&self, collection: Collection, key: &str, update: Update) -> Result<()> {
        let write = Write::Update {
            collection,
            key: key.to_string(),
            update,
        };
        self.write(write, None).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        let write = Write::Delete {
            collection,
            key: key.to_string(),
        };
        self.write(write, None).await
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let found: Vec<BsonDocument> = self
            .coll(collection)
            .find(to_filter_document(filter)?, options)
            .await?
            .try_collect()
            .await?;
        found.into_iter().map(from_bson_document).collect()
    }

    async fn commit(&self, batch: Batch) -> Result<()> {
        debug!("Committing batch of {} writes", batch.len());
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        for write in batch {
            if let Err(err) = self.write(write, Some(&mut session)).await {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("Failed to abort transaction: {abort_err}");
                }
                return Err(err);
            }
        }

        session.commit_transaction().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn update_document_splits_set_and_unset() {
        let update = Update::new()
            .set("hasVoted", false)
            .set("votedFor", Value::Null)
            .delete("votedAt");
        let update_doc = to_update_document(&update).unwrap();
        assert_eq!(
            update_doc,
            doc! {
                "$set": { "hasVoted": false, "votedFor": Bson::Null },
                "$unset": { "votedAt": "" },
            }
        );
    }

    #[test]
    fn bson_round_trip_strips_id() {
        let record = match json!({"regNum": "V1", "hasVoted": true, "votedFor": null}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let bson_doc = to_bson_document("V1", &record).unwrap();
        assert_eq!(bson_doc.get_str("_id").unwrap(), "V1");
        assert_eq!(from_bson_document(bson_doc).unwrap(), record);
    }

    /// Needs a MongoDB replica set at `OVS_DB_URI`.
    #[rocket::async_test]
    #[ignore = "requires a running MongoDB replica set"]
    async fn batch_is_atomic() {
        let uri = std::env::var("OVS_DB_URI").unwrap();
        let db_name = format!("test{}", rand::random::<u32>());
        let store = MongoStore::connect(&uri, &db_name).await.unwrap();

        let record = match json!({"n": 1}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        store
            .set(Collection::Users, "A", record.clone())
            .await
            .unwrap();

        let mut batch = Batch::new();
        batch.delete(Collection::Users, "A");
        batch.insert(Collection::Users, "B", record.clone());
        batch.insert(Collection::Users, "B", record.clone());
        let result = store.commit(batch).await;

        let a = store.get(Collection::Users, "A").await.unwrap();
        let b = store.get(Collection::Users, "B").await.unwrap();
        store.drop_database().await.unwrap();

        assert!(result.is_err());
        assert_eq!(a, Some(record));
        assert_eq!(b, None);
    }
}
