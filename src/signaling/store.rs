use std::sync::mpsc::Sender;

use serde_json::{Value, json};

use crate::signaling::{
    document::{Document, Fields, StoreNotification},
    paths::{CollectionPath, DocPath},
    query::{Query, Watch},
    store_error::StoreError,
};

pub type SubscriptionId = u64;

const SERVER_VALUE_KEY: &str = ".sv";
const SERVER_TIMESTAMP: &str = "timestamp";

/// Placeholder the store replaces with its own commit timestamp.
pub fn server_timestamp() -> Value {
    json!({ SERVER_VALUE_KEY: SERVER_TIMESTAMP })
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|o| o.get(SERVER_VALUE_KEY))
        .and_then(Value::as_str)
        == Some(SERVER_TIMESTAMP)
}

/// Document database with live queries, as seen by the call core.
///
/// Writes return once the store has accepted them; their effects reach
/// watchers as [`StoreNotification`]s on the channel given to
/// [`subscribe`](Self::subscribe). Each subscriber receives snapshots in
/// commit order; nothing is promised across subscriptions.
pub trait SignalingStore: Send + Sync {
    /// Creates a document with a store-assigned id.
    fn create(&self, collection: &CollectionPath, fields: Fields) -> Result<DocPath, StoreError>;

    /// Merges `fields` into an existing document.
    fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    /// Deletes a document. Deleting a missing document succeeds. Nested
    /// collections are not touched.
    fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Registers a watcher. The current snapshot is delivered immediately,
    /// then one snapshot per commit that changes the result.
    fn subscribe(
        &self,
        watch: Watch,
        tx: Sender<StoreNotification>,
    ) -> Result<SubscriptionId, StoreError>;

    fn unsubscribe(&self, id: SubscriptionId);
}
