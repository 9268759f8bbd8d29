//! SQLite-backed document store
//!
//! Documents are kept as JSON text in a single table keyed by
//! `(namespace, collection, id)`. The namespace is the configured database
//! name, so several deployments can share one file.
//!
//! Filter conditions on plain keys are pushed into SQL through
//! `json_extract`, with an expression index on `slug` for page lookups.
//! Candidate rows are still checked with [`Filter::matches`], since SQLite
//! compares `true` and `1` as equal.
//!
//! rusqlite is blocking: every operation runs on the blocking pool.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::document::{self, Document, Filter, ID_FIELD};
use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace  TEXT NOT NULL,
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL,
    UNIQUE (namespace, collection, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_collection
    ON documents (namespace, collection, seq);
CREATE INDEX IF NOT EXISTS idx_documents_slug
    ON documents (namespace, collection, json_extract(body, '$.slug'));
";

struct Database {
    conn: Mutex<Connection>,
    namespace: String,
}

pub struct SqliteDocumentStore {
    db: Arc<Database>,
}

impl SqliteDocumentStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, namespace: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        info!(path = %path.display(), "Document store opened");
        Self::init(conn, namespace.into())
    }

    /// Open a private in-memory database
    pub fn open_in_memory(namespace: impl Into<String>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, namespace.into())
    }

    fn init(conn: Connection, namespace: String) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Database {
                conn: Mutex::new(conn),
                namespace,
            }),
        })
    }

    /// Run blocking database work off the async runtime
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database, &Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(db.as_ref(), &conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

impl Database {
    /// Visit documents of a collection matching `filter`, in insertion
    /// order, until `visit` returns `false`.
    fn scan<F>(
        &self,
        conn: &Connection,
        collection: &str,
        filter: &Filter,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(String, Document) -> bool,
    {
        let mut sql =
            String::from("SELECT id, body FROM documents WHERE namespace = ? AND collection = ?");
        let mut args = vec![
            SqlValue::Text(self.namespace.clone()),
            SqlValue::Text(collection.to_string()),
        ];

        for (field, expected) in filter.conditions() {
            let Some(arg) = sql_value(expected) else {
                continue;
            };
            if field == ID_FIELD {
                sql.push_str(" AND id = ?");
            } else if is_plain_key(field) {
                let _ = write!(sql, " AND json_extract(body, '$.{field}') = ?");
            } else {
                continue;
            }
            args.push(arg);
        }
        sql.push_str(" ORDER BY seq");

        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (id, body) = row?;
            let doc: Document = serde_json::from_str(&body)?;
            if filter.matches(&doc) && !visit(id, doc) {
                break;
            }
        }
        Ok(())
    }
}

/// Scalar JSON values that can be compared in SQL
fn sql_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Keys safe to splice into a `json_extract` path
fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create(&self, collection: &str, mut doc: Document) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        document::stamp_new(&mut doc, &id, Utc::now());
        let body = serde_json::to_string(&doc)?;
        let collection = collection.to_string();
        let row_id = id.clone();

        self.run(move |db, conn| {
            conn.execute(
                "INSERT INTO documents (namespace, collection, id, body) VALUES (?1, ?2, ?3, ?4)",
                params![db.namespace, collection, row_id, body],
            )?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    async fn get(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let collection = collection.to_string();
        let filter = filter.clone();

        self.run(move |db, conn| {
            let mut found = None;
            db.scan(conn, &collection, &filter, |_, doc| {
                found = Some(doc);
                false
            })?;
            Ok(found)
        })
        .await
    }

    async fn list(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let collection = collection.to_string();
        let filter = filter.clone();

        self.run(move |db, conn| {
            let mut docs = Vec::new();
            db.scan(conn, &collection, &filter, |_, doc| {
                docs.push(doc);
                docs.len() < limit
            })?;
            Ok(docs)
        })
        .await
    }

    async fn update(&self, collection: &str, filter: &Filter, patch: Document) -> Result<u64> {
        let collection = collection.to_string();
        let filter = filter.clone();

        // Read, merge and write under one lock hold
        self.run(move |db, conn| {
            let mut target = None;
            db.scan(conn, &collection, &filter, |id, doc| {
                target = Some((id, doc));
                false
            })?;

            let Some((id, mut doc)) = target else {
                return Ok(0);
            };

            document::apply_patch(&mut doc, patch, Utc::now());
            let body = serde_json::to_string(&doc)?;
            let changed = conn.execute(
                "UPDATE documents SET body = ?1 WHERE namespace = ?2 AND collection = ?3 AND id = ?4",
                params![body, db.namespace, collection, id],
            )?;
            Ok(changed as u64)
        })
        .await
    }

    async fn collections(&self) -> Result<Vec<String>> {
        self.run(|db, conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT collection FROM documents WHERE namespace = ?1 ORDER BY collection",
            )?;
            let names = stmt
                .query_map(params![db.namespace], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.run(|_, conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .optional()?
                .map(|_| ())
                .ok_or_else(|| StoreError::Backend("ping returned no rows".into()))
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.run(|_, conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .optional()?;
            Ok(())
        })
        .await?;
        info!(namespace = %self.db.namespace, "Document store closed");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_sqlite() {
        let store = SqliteDocumentStore::open_in_memory("eternal_flame").unwrap();
        let id = store
            .create("flame", doc(json!({"slug": "alex-sam-x1", "photos": ["https://a/b.png"]})))
            .await
            .unwrap();

        let found = store
            .get("flame", &Filter::new().eq("slug", "alex-sam-x1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found[ID_FIELD], json!(id));
        assert_eq!(found["photos"], json!(["https://a/b.png"]));
        assert!(found.contains_key(CREATED_AT_FIELD));
    }

    #[tokio::test]
    async fn test_update_persists_patch() {
        let store = SqliteDocumentStore::open_in_memory("eternal_flame").unwrap();
        let id = store
            .create("flame", doc(json!({"payment_status": "unpaid"})))
            .await
            .unwrap();
        let before = store.get("flame", &Filter::by_id(&id)).await.unwrap().unwrap();

        let updated = store
            .update(
                "flame",
                &Filter::by_id(&id),
                doc(json!({"payment_status": "paid", "created_at": "1999-01-01T00:00:00Z"})),
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let after = store.get("flame", &Filter::by_id(&id)).await.unwrap().unwrap();
        assert_eq!(after["payment_status"], json!("paid"));
        assert_eq!(after[CREATED_AT_FIELD], before[CREATED_AT_FIELD]);
        assert!(after.contains_key(UPDATED_AT_FIELD));

        let missing = store
            .update("flame", &Filter::by_id("nope"), Document::new())
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn test_list_respects_limit_and_order() {
        let store = SqliteDocumentStore::open_in_memory("eternal_flame").unwrap();
        for i in 0..4 {
            store.create("flame", doc(json!({"n": i}))).await.unwrap();
        }

        let docs = store.list("flame", &Filter::new(), 3).await.unwrap();
        let ns: Vec<_> = docs.iter().map(|d| d["n"].clone()).collect();
        assert_eq!(ns, vec![json!(0), json!(1), json!(2)]);

        assert!(store.list("flame", &Filter::new(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let path = std::env::temp_dir().join(format!("flame-store-{}.db", uuid::Uuid::new_v4()));
        let prod = SqliteDocumentStore::open(&path, "prod").unwrap();
        prod.create("flame", Document::new()).await.unwrap();
        prod.close().await.unwrap();

        let staging = SqliteDocumentStore::open(&path, "staging").unwrap();
        assert!(staging.collections().await.unwrap().is_empty());
        assert!(staging.ping().await.is_ok());

        let reopened = SqliteDocumentStore::open(&path, "prod").unwrap();
        assert_eq!(reopened.collections().await.unwrap(), vec!["flame"]);

        drop((prod, staging, reopened));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_filters_pushed_into_sql_keep_json_equality() {
        let store = SqliteDocumentStore::open_in_memory("eternal_flame").unwrap();
        store
            .create("flame", doc(json!({"slug": "a", "allow_public_gallery": true, "n": 1})))
            .await
            .unwrap();
        store
            .create("flame", doc(json!({"slug": "b", "allow_public_gallery": 1, "n": 1.5})))
            .await
            .unwrap();

        let public = store
            .list("flame", &Filter::new().eq("allow_public_gallery", true), 10)
            .await
            .unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0]["slug"], json!("a"));

        let by_float = store.get("flame", &Filter::new().eq("n", 1.5)).await.unwrap().unwrap();
        assert_eq!(by_float["slug"], json!("b"));

        let odd_key = store
            .list("flame", &Filter::new().eq("odd key'", "x"), 10)
            .await
            .unwrap();
        assert!(odd_key.is_empty());

        assert!(store.get("flame", &Filter::new().eq("slug", "c")).await.unwrap().is_none());
    }

    #[test]
    fn test_slug_index_created() {
        let store = SqliteDocumentStore::open_in_memory("eternal_flame").unwrap();
        let conn = store.db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_documents_slug'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_plain_keys() {
        assert!(is_plain_key("slug"));
        assert!(is_plain_key("payment_status"));
        assert!(!is_plain_key("a.b"));
        assert!(!is_plain_key("1st"));
        assert!(!is_plain_key("x') OR 1=1 --"));
        assert!(!is_plain_key(""));
    }
}
