//! RustyCall orchestrates one-to-one audio calls between two peers that
//! only share a document store.
//!
//! Both peers watch the session's `calls` collection. Starting, accepting,
//! rejecting and ending a call are writes to that collection; everything
//! else (offer/answer exchange, ICE candidate relay, media capture and
//! teardown) is driven by what each peer observes. A [`core::CallController`]
//! bundles all of it behind a poll loop.

/// Call record, status machine, roles and deferred deletion.
pub mod call;
/// INI configuration and typed call settings.
pub mod config;
/// UI-facing controller, notices and view model.
pub mod core;
/// Leveled logging sinks and the background file logger.
pub mod log;
/// Local audio capture, mute and per-call resource teardown.
pub mod media;
/// Offer/answer and candidate exchange over the store.
pub mod negotiation;
/// Document store interface, paths, queries and the in-process store.
pub mod signaling;
pub mod utils;
