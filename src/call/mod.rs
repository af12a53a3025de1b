//! Call Lifecycle Manager: the call record, its status machine and the
//! deferred deletion of finished calls.
pub mod call_error;
pub mod call_record;
pub mod cleanup;
pub mod lifecycle;
pub mod role;

pub use call_error::CallError;
pub use call_record::{CallId, CallRecord, CallStatus};
pub use cleanup::{CleanupScheduler, purge_call};
pub use lifecycle::{CallLifecycle, Transition};
pub use role::{Role, acting_role, role};
