use std::fs;
use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::error::StoreError;
use crate::id::IssueId;
use crate::store::{Document, DocumentStore, Fields, Filter};

/// SQLite-backed document store. Every collection shares one table, keyed by
/// collection name and document id; bodies are JSON text.
pub struct SqliteStore {
    conn: Option<Connection>,
}

fn document_from_row(row: &rusqlite::Row) -> Result<(String, String), rusqlite::Error> {
    Ok((row.get("id")?, row.get("body")?))
}

fn decode_document(id: String, body: String) -> Result<Document, StoreError> {
    let parsed = IssueId::parse(&id).map_err(|e| StoreError::Corrupt {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    let fields: Fields = serde_json::from_str(&body).map_err(|e| StoreError::Corrupt {
        id,
        reason: e.to_string(),
    })?;
    Ok(Document { id: parsed, fields })
}

/// SQL comparison value for a JSON scalar as `json_extract` returns it.
/// Booleans come back as integers.
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

fn json_path(field: &str) -> Option<String> {
    if field.is_empty() || field.contains('"') {
        return None;
    }
    Some(format!("$.\"{field}\""))
}

fn encode_body(fields: &Fields) -> Result<String, StoreError> {
    let body: Fields = fields
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(serde_json::to_string(&body)?)
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<SqliteStore, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StoreError::Open)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<SqliteStore, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<SqliteStore, StoreError> {
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(StoreError::Open)?;
        Self::run_migrations(&conn)?;
        Ok(SqliteStore { conn: Some(conn) })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL CHECK (json_valid(body)),
                PRIMARY KEY (collection, id)
            );",
        )
        .map_err(StoreError::Migration)
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }
}

impl DocumentStore for SqliteStore {
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn()?;

        let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(collection.to_string())];

        if let Some(id) = filter.id {
            sql.push_str(" AND id = ?");
            values.push(SqlValue::Text(id.to_string()));
        }
        for (field, expected) in &filter.fields {
            // A condition no stored scalar can satisfy matches nothing.
            let (Some(path), Some(expected)) = (json_path(field), sql_value(expected)) else {
                return Ok(Vec::new());
            };
            sql.push_str(" AND json_extract(body, ?) = ?");
            values.push(SqlValue::Text(path));
            values.push(expected);
        }
        sql.push_str(" ORDER BY rowid");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| decode_document(id, body))
            .collect()
    }

    fn insert_one(&self, collection: &str, fields: &Fields) -> Result<IssueId, StoreError> {
        let conn = self.conn()?;
        let id = IssueId::generate();
        let body = encode_body(fields)?;

        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            rusqlite::params![collection, id.to_string(), body],
        )?;

        Ok(id)
    }

    fn update_one(&self, collection: &str, id: IssueId, set: &Fields) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let patch = encode_body(set)?;

        let modified = conn.execute(
            "UPDATE documents SET body = CASE
                WHEN json_extract(?1, '$.updated_on') IS NULL THEN json_patch(body, ?1)
                ELSE json_set(json_patch(body, ?1), '$.updated_on', max(
                    json_extract(?1, '$.updated_on'),
                    coalesce(strftime('%Y-%m-%dT%H:%M:%fZ', json_extract(body, '$.updated_on'), '+0.001 seconds'), ''),
                    coalesce(json_extract(body, '$.created_on'), '')
                ))
            END
            WHERE collection = ?2 AND id = ?3",
            rusqlite::params![patch, collection, id.to_string()],
        )?;

        Ok(modified as u64)
    }

    fn delete_one(&self, collection: &str, id: IssueId) -> Result<u64, StoreError> {
        let conn = self.conn()?;

        let deleted = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id.to_string()],
        )?;

        Ok(deleted as u64)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| StoreError::Query(e)),
            None => Ok(()),
        }
    }
}
