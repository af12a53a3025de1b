use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::signaling::{paths::DocPath, store::SubscriptionId, store_error::StoreError};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decodes the fields into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| StoreError::InvalidDocument(format!("{}: {e}", self.path)))
    }
}

/// Encodes a serializable value into document fields. Only JSON objects are
/// valid documents.
pub fn to_fields<T: serde::Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::InvalidDocument(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(StoreError::InvalidDocument(e.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocChange {
    pub kind: ChangeKind,
    pub doc: Document,
}

/// Result of a watch at one point in time, plus what changed since the
/// previous snapshot delivered to the same subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub docs: Vec<Document>,
    pub changes: Vec<DocChange>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn first(&self) -> Option<&Document> {
        self.docs.first()
    }

    /// Documents that entered the result with this snapshot.
    pub fn added(&self) -> impl Iterator<Item = &Document> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .map(|c| &c.doc)
    }
}

/// One message on a subscriber's channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreNotification {
    pub subscription: SubscriptionId,
    pub snapshot: Snapshot,
}
