//! Document store on SQLite: collections of JSON documents addressed by
//! `collection/doc_id`, with store-assigned timestamps and per-list fan-out.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    constants::LIST_CHANNEL_CAPACITY,
    data_types::ShoppingList,
    errors::{DocumentParseError, PlannerError},
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Live-update senders per shopping list id.
pub(crate) type ListChannels = Arc<Mutex<HashMap<String, broadcast::Sender<ShoppingList>>>>;

pub struct Database {
    conn: Mutex<Connection>,
    list_channels: ListChannels,
}

pub fn server_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DocumentParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DocumentParseError::Json(format!("bad timestamp '{}': {}", raw, e)))
}

type RawRow = (String, String, String, String);

fn raw_row(row: &Row) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_document((id, json_text, created_at, updated_at): RawRow) -> Result<StoredDocument, PlannerError> {
    Ok(StoredDocument {
        data: serde_json::from_str(&json_text).map_err(DocumentParseError::from)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        id,
    })
}

fn check_or_create_db_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "create table if not exists documents (
            collection text not null,
            doc_id text not null,
            json_text text not null,
            created_at text not null,
            updated_at text not null,
            primary key (collection, doc_id)
        )",
        [],
    )?;

    conn.execute(
        "create index if not exists documents_by_collection
            on documents (collection, created_at)",
        [],
    )?;

    Ok(())
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PlannerError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PlannerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, PlannerError> {
        check_or_create_db_tables(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
            list_channels: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PlannerError> {
        self.conn
            .lock()
            .map_err(|_| PlannerError::Unavailable("database lock poisoned".to_string()))
    }

    /// Adds a document under a fresh id and returns that id.
    pub fn add_document(&self, collection: &str, data: &Value) -> Result<String, PlannerError> {
        let id = Uuid::new_v4().simple().to_string();
        self.set_document(collection, &id, data)?;
        Ok(id)
    }

    /// Creates or fully replaces a document. `created_at` survives replacement.
    pub fn set_document(&self, collection: &str, id: &str, data: &Value) -> Result<(), PlannerError> {
        let conn = self.conn()?;
        let now = server_timestamp();
        conn.prepare_cached(
            "insert into documents (collection, doc_id, json_text, created_at, updated_at)
                values (?1, ?2, ?3, ?4, ?4)
                on conflict (collection, doc_id) do update set
                    json_text = excluded.json_text,
                    updated_at = excluded.updated_at",
        )?
        .execute(params![collection, id, data.to_string(), now])?;

        log::debug!("set {}/{}", collection, id);
        Ok(())
    }

    pub fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, PlannerError> {
        let conn = self.conn()?;
        let raw = conn
            .prepare_cached(
                "select doc_id, json_text, created_at, updated_at
                    from documents
                    where collection = ?1 and doc_id = ?2",
            )?
            .query_row(params![collection, id], raw_row)
            .optional()?;

        raw.map(into_document).transpose()
    }

    /// All documents of a collection, oldest first.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>, PlannerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "select doc_id, json_text, created_at, updated_at
                from documents
                where collection = ?1
                order by created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![collection], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(into_document).collect()
    }

    /// Documents whose top-level `field` equals `value`.
    pub fn query_field_equals(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDocument>, PlannerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "select doc_id, json_text, created_at, updated_at
                from documents
                where collection = ?1 and json_extract(json_text, ?2) = ?3
                order by created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![collection, format!("$.{}", field), value], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(into_document).collect()
    }

    /// Documents whose top-level array `field` contains `value`.
    pub fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDocument>, PlannerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "select doc_id, json_text, created_at, updated_at
                from documents
                where collection = ?1
                    and exists (select 1 from json_each(documents.json_text, ?2) where value = ?3)
                order by created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![collection, format!("$.{}", field), value], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(into_document).collect()
    }

    /// Read-modify-write of one document under the connection lock.
    /// Returns the written document, or `None` if it does not exist.
    pub fn update_document<F>(
        &self,
        collection: &str,
        id: &str,
        mutate: F,
    ) -> Result<Option<Value>, PlannerError>
    where
        F: FnOnce(&mut Value) -> Result<(), PlannerError>,
    {
        self.write_document(
            collection,
            id,
            None,
            |doc| {
                mutate(doc)?;
                Ok(doc.clone())
            },
            |_| {},
        )
    }

    /// Like [`Database::update_document`], but a missing document starts out as `default`
    /// and is created in the same transaction.
    pub fn upsert_document<F>(
        &self,
        collection: &str,
        id: &str,
        default: Value,
        mutate: F,
    ) -> Result<Value, PlannerError>
    where
        F: FnOnce(&mut Value) -> Result<(), PlannerError>,
    {
        let written = self.write_document(
            collection,
            id,
            Some(default),
            |doc| {
                mutate(doc)?;
                Ok(doc.clone())
            },
            |_| {},
        )?;
        written.ok_or_else(|| PlannerError::not_found("document", id))
    }

    /// One transaction: read (or start from `default`), mutate, write, commit.
    ///
    /// `committed` runs after the commit while the connection lock is still held,
    /// so its side effects happen in commit order.
    pub(crate) fn write_document<T, F, G>(
        &self,
        collection: &str,
        id: &str,
        default: Option<Value>,
        mutate: F,
        committed: G,
    ) -> Result<Option<T>, PlannerError>
    where
        F: FnOnce(&mut Value) -> Result<T, PlannerError>,
        G: FnOnce(&T),
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "select json_text from documents where collection = ?1 and doc_id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        let mut data: Value = match (current, default) {
            (Some(json_text), _) => {
                serde_json::from_str(&json_text).map_err(DocumentParseError::from)?
            }
            (None, Some(default)) => default,
            (None, None) => return Ok(None),
        };
        let out = mutate(&mut data)?;

        let now = server_timestamp();
        tx.execute(
            "insert into documents (collection, doc_id, json_text, created_at, updated_at)
                values (?1, ?2, ?3, ?4, ?4)
                on conflict (collection, doc_id) do update set
                    json_text = excluded.json_text,
                    updated_at = excluded.updated_at",
            params![collection, id, data.to_string(), now],
        )?;
        tx.commit()?;

        committed(&out);
        drop(conn);

        log::debug!("wrote {}/{}", collection, id);
        Ok(Some(out))
    }

    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool, PlannerError> {
        let conn = self.conn()?;
        let deleted = conn
            .prepare_cached("delete from documents where collection = ?1 and doc_id = ?2")?
            .execute(params![collection, id])?;

        Ok(deleted > 0)
    }

    /// Receiver of every snapshot published for `list_id` from now on.
    pub(crate) fn list_receiver(
        &self,
        list_id: &str,
    ) -> Result<broadcast::Receiver<ShoppingList>, PlannerError> {
        let mut channels = self
            .list_channels
            .lock()
            .map_err(|_| PlannerError::Unavailable("listener registry poisoned".to_string()))?;
        let tx = channels
            .entry(list_id.to_string())
            .or_insert_with(|| broadcast::channel(LIST_CHANNEL_CAPACITY).0);

        Ok(tx.subscribe())
    }

    pub(crate) fn list_channels(&self) -> ListChannels {
        Arc::clone(&self.list_channels)
    }

    #[cfg(test)]
    pub(crate) fn open_list_channels(&self) -> usize {
        self.list_channels.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub(crate) fn publish_list(&self, list: &ShoppingList) {
        let Ok(mut channels) = self.list_channels.lock() else {
            log::error!("listener registry poisoned, dropping update of {}", list.id);
            return;
        };
        if let Some(tx) = channels.get(&list.id) {
            // Err only means nobody listens anymore
            if tx.send(list.clone()).is_err() {
                channels.remove(&list.id);
            }
        }
    }

    /// Closes every subscription of a deleted list.
    pub(crate) fn close_list_channel(&self, list_id: &str) {
        if let Ok(mut channels) = self.list_channels.lock() {
            channels.remove(list_id);
        }
    }
}

/// Drops the sender of `list_id` once at most `still_held` receivers remain.
pub(crate) fn release_list_channel(channels: &ListChannels, list_id: &str, still_held: usize) {
    let Ok(mut channels) = channels.lock() else {
        return;
    };
    if channels
        .get(list_id)
        .is_some_and(|tx| tx.receiver_count() <= still_held)
    {
        channels.remove(list_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_replace_keeps_created_at() {
        let db = Database::open_in_memory().unwrap();
        db.set_document("c", "a", &json!({ "v": 1 })).unwrap();
        let first = db.get_document("c", "a").unwrap().unwrap();

        db.set_document("c", "a", &json!({ "v": 2 })).unwrap();
        let second = db.get_document("c", "a").unwrap().unwrap();

        assert_eq!(second.data["v"], 2);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn collections_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        db.add_document("users/a/stock", &json!({ "nom": "riz" })).unwrap();
        db.add_document("users/b/stock", &json!({ "nom": "sel" })).unwrap();

        let docs = db.list_documents("users/a/stock").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].data["nom"], "riz");
        assert!(db.get_document("users/b/stock", &docs[0].id).unwrap().is_none());
    }

    #[test]
    fn field_and_array_queries() {
        let db = Database::open_in_memory().unwrap();
        db.set_document("l", "1", &json!({ "ownerId": "alice", "sharedWith": ["bob"] }))
            .unwrap();
        db.set_document("l", "2", &json!({ "ownerId": "bob", "sharedWith": [] }))
            .unwrap();

        let owned = db.query_field_equals("l", "ownerId", "bob").unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, "2");

        let shared = db.query_array_contains("l", "sharedWith", "bob").unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, "1");
    }

    #[test]
    fn update_missing_document_is_none() {
        let db = Database::open_in_memory().unwrap();
        let res = db.update_document("c", "nope", |_| Ok(())).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn failed_mutation_leaves_document_untouched() {
        let db = Database::open_in_memory().unwrap();
        db.set_document("c", "a", &json!({ "v": 1 })).unwrap();

        let res = db.update_document("c", "a", |doc| {
            doc["v"] = json!(2);
            Err(PlannerError::MalformedInput("nope".into()))
        });
        assert!(res.is_err());
        assert_eq!(db.get_document("c", "a").unwrap().unwrap().data["v"], 1);
    }

    #[test]
    fn upsert_creates_then_mutates() {
        let db = Database::open_in_memory().unwrap();
        let push = |doc: &mut Value| -> Result<(), PlannerError> {
            doc["n"] = json!(doc["n"].as_i64().unwrap_or(0) + 1);
            Ok(())
        };
        db.upsert_document("c", "a", json!({ "n": 0 }), push).unwrap();
        let second = db.upsert_document("c", "a", json!({ "n": 0 }), push).unwrap();
        assert_eq!(second["n"], 2);
    }

    #[test]
    fn concurrent_upserts_all_land() {
        let db = Database::open_in_memory().unwrap();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10 {
                        db.upsert_document("c", "counter", json!({ "n": 0 }), |doc| {
                            doc["n"] = json!(doc["n"].as_i64().unwrap_or(0) + 1);
                            Ok(())
                        })
                        .unwrap();
                    }
                });
            }
        });
        assert_eq!(db.get_document("c", "counter").unwrap().unwrap().data["n"], 80);
    }

    #[test]
    fn delete_reports_existence() {
        let db = Database::open_in_memory().unwrap();
        let id = db.add_document("c", &json!({})).unwrap();
        assert!(db.delete_document("c", &id).unwrap());
        assert!(!db.delete_document("c", &id).unwrap());
    }
}
