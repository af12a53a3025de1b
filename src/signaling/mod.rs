//! Signaling Store: the document database both peers use as a relay for
//! call records, session descriptions and ICE candidates.
pub mod document;
pub mod memory_store;
pub mod paths;
pub mod query;
pub mod store;
pub mod store_error;

pub use document::{ChangeKind, DocChange, Document, Fields, Snapshot, StoreNotification};
pub use memory_store::MemoryStore;
pub use paths::{CandidateSet, CollectionPath, DocPath};
pub use query::{Direction, Filter, Query, Watch};
pub use store::{SignalingStore, SubscriptionId, is_server_timestamp, server_timestamp};
pub use store_error::StoreError;
