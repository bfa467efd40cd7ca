use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::error::StoreError;
use crate::id::IssueId;

pub type Fields = serde_json::Map<String, Value>;

/// A stored document: its store-assigned identifier and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: IssueId,
    pub fields: Fields,
}

impl Document {
    /// The document as clients see it, with the identifier under `_id`.
    pub fn into_value(self) -> Value {
        let mut map = Fields::with_capacity(self.fields.len() + 1);
        map.insert("_id".into(), Value::String(self.id.to_string()));
        map.extend(self.fields.into_iter().filter(|(k, _)| k != "_id"));
        Value::Object(map)
    }
}

/// Conjunction of exact-equality conditions. An empty filter matches every
/// document in the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub id: Option<IssueId>,
    pub fields: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn id(mut self, id: IssueId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }
}

pub trait DocumentStore: Send {
    /// Documents of `collection` matching `filter`, in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Inserts a document and returns the identifier the store assigned.
    fn insert_one(&self, collection: &str, fields: &Fields) -> Result<IssueId, StoreError>;

    /// Merges `set` into the document with `id`; returns the modified count.
    ///
    /// When `set` carries an `updated_on` timestamp, the stored value ends up
    /// strictly later than the previous one and never before `created_on`.
    fn update_one(&self, collection: &str, id: IssueId, set: &Fields) -> Result<u64, StoreError>;

    /// Returns the deleted count.
    fn delete_one(&self, collection: &str, id: IssueId) -> Result<u64, StoreError>;

    /// Releases the underlying connection. Later calls fail with
    /// [`StoreError::Closed`].
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Shared, lockable handle to a store, cloned into every request.
#[derive(Clone)]
pub struct StoreHandle(Arc<Mutex<dyn DocumentStore>>);

impl StoreHandle {
    pub fn new(store: impl DocumentStore + 'static) -> Self {
        let shared: Arc<Mutex<dyn DocumentStore>> = Arc::new(Mutex::new(store));
        StoreHandle(shared)
    }

    fn lock(&self) -> Result<MutexGuard<'_, dyn DocumentStore + 'static>, StoreError> {
        self.0.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.lock()?.find(collection, filter)
    }

    pub fn insert_one(&self, collection: &str, fields: &Fields) -> Result<IssueId, StoreError> {
        self.lock()?.insert_one(collection, fields)
    }

    pub fn update_one(
        &self,
        collection: &str,
        id: IssueId,
        set: &Fields,
    ) -> Result<u64, StoreError> {
        self.lock()?.update_one(collection, id, set)
    }

    pub fn delete_one(&self, collection: &str, id: IssueId) -> Result<u64, StoreError> {
        self.lock()?.delete_one(collection, id)
    }

    pub fn close(&self) -> Result<(), StoreError> {
        self.lock()?.close()
    }
}
