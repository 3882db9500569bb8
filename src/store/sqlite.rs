use std::time::Duration;

use log::debug;
use serde_json::Value;
use sqlx::{
    sqlite::{
        SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    },
    Error as SqlxError,
};

use crate::error::{Error, Result};

use super::{missing, Batch, Collection, Document, FieldUpdate, Filter, Store, Update, Write};

/// How long a write waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// A store backed by a local SQLite file.
///
/// Each collection is a two-column table: the record key and the record
/// body as JSON text. Equality queries go through `json_extract`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// A private in-memory database. Every pooled connection would get its
    /// own database, so the pool holds exactly one connection forever.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    /// Ensure the tables exist on the given pool.
    ///
    /// This operation is idempotent.
    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        debug!("Ensuring SQLite tables exist");
        for collection in Collection::ALL {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY NOT NULL, body TEXT NOT NULL)",
                collection.name()
            );
            sqlx::query(&sql).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn parse_body(body: &str) -> Result<Document> {
    Ok(serde_json::from_str(body)?)
}

async fn fetch(
    conn: &mut SqliteConnection,
    collection: Collection,
    key: &str,
) -> Result<Option<Document>> {
    let sql = format!("SELECT body FROM {} WHERE key = ?", collection.name());
    let body: Option<String> = sqlx::query_scalar(&sql)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    body.as_deref().map(parse_body).transpose()
}

async fn write(conn: &mut SqliteConnection, write: Write) -> Result<()> {
    match write {
        Write::Insert {
            collection,
            key,
            doc,
        } => {
            let sql = format!("INSERT INTO {} (key, body) VALUES (?, ?)", collection.name());
            let body = serde_json::to_string(&doc)?;
            sqlx::query(&sql)
                .bind(key.clone())
                .bind(body)
                .execute(&mut *conn)
                .await
                .map_err(|err| match err {
                    SqlxError::Database(ref db_err) if db_err.is_unique_violation() => {
                        Error::DuplicateKey {
                            collection: collection.name(),
                            key: key.clone(),
                        }
                    }
                    err => err.into(),
                })?;
        }
        Write::Set {
            collection,
            key,
            doc,
        } => {
            let sql = format!(
                "INSERT OR REPLACE INTO {} (key, body) VALUES (?, ?)",
                collection.name()
            );
            sqlx::query(&sql)
                .bind(key)
                .bind(serde_json::to_string(&doc)?)
                .execute(&mut *conn)
                .await?;
        }
        Write::Update {
            collection,
            key,
            update,
        } => {
            // A single statement: no read lock is held before the write.
            let mut sets = vec![];
            let mut deletes = vec![];
            for (field, change) in update.iter() {
                match change {
                    FieldUpdate::Set(value) => sets.push((field, serde_json::to_string(value)?)),
                    FieldUpdate::Delete => deletes.push(field),
                }
            }

            let sql = format!(
                "UPDATE {} SET body = {} WHERE key = ?",
                collection.name(),
                updated_body(sets.len(), deletes.len())
            );
            let mut query = sqlx::query(&sql);
            for (field, value) in sets {
                query = query.bind(format!("$.{field}")).bind(value);
            }
            for field in deletes {
                query = query.bind(format!("$.{field}"));
            }
            let result = query.bind(key.clone()).execute(&mut *conn).await?;
            if result.rows_affected() == 0 {
                return Err(missing(collection, &key));
            }
        }
        Write::Delete { collection, key } => {
            let sql = format!("DELETE FROM {} WHERE key = ?", collection.name());
            sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
        }
    }
    Ok(())
}

/// The SQL expression for `body` after `sets` field assignments and then
/// `deletes` field removals, with the paths and JSON values as parameters.
fn updated_body(sets: usize, deletes: usize) -> String {
    let mut expr = "body".to_string();
    if sets > 0 {
        let pairs = vec![", ?, json(?)"; sets].concat();
        expr = format!("json_set({expr}{pairs})");
    }
    if deletes > 0 {
        let paths = vec![", ?"; deletes].concat();
        expr = format!("json_remove({expr}{paths})");
    }
    expr
}

/// Build the `WHERE` clause for an equality filter.
fn where_clause(filter: &Filter) -> String {
    let conditions: Vec<&str> = filter
        .iter()
        .map(|(_, value)| match value {
            Value::Null => "json_extract(body, ?) IS NULL",
            _ => "json_extract(body, ?) = ?",
        })
        .collect();
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

impl SqliteStore {
    /// Run a single write in its own transaction.
    async fn write_one(&self, single: Write) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write(&mut *tx, single).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl Store for SqliteStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut *conn, collection, key).await
    }

    async fn set(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        self.write_one(Write::Set {
            collection,
            key: key.to_string(),
            doc,
        })
        .await
    }

    async fn insert(&self, collection: Collection, key: &str, doc: Document) -> Result<()> {
        self.write_one(Write::Insert {
            collection,
            key: key.to_string(),
            doc,
        })
        .await
    }

    async fn update(&self, collection: Collection, key: &str, update: Update) -> Result<()> {
        self.write_one(Write::Update {
            collection,
            key: key.to_string(),
            update,
        })
        .await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        self.write_one(Write::Delete {
            collection,
            key: key.to_string(),
        })
        .await
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT body FROM {}{} ORDER BY key",
            collection.name(),
            where_clause(filter)
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for (field, value) in filter.iter() {
            query = query.bind(format!("$.{field}"));
            query = match value {
                Value::Null => query,
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64()),
                },
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }
        let bodies = query.fetch_all(&self.pool).await?;
        bodies.iter().map(|body| parse_body(body)).collect()
    }

    async fn commit(&self, batch: Batch) -> Result<()> {
        debug!("Committing batch of {} writes", batch.len());
        let mut tx = self.pool.begin().await?;
        for single in batch {
            // Dropping the transaction on error rolls it back.
            write(&mut *tx, single).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
