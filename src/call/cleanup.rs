use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::call::call_record::CallId;
use crate::signaling::{
    paths::{CandidateSet, DocPath},
    query::Query,
    store::SignalingStore,
    store_error::StoreError,
};

/// Deferred deletion of finished calls, keyed by call id.
///
/// Nothing here runs on its own: the owner asks for [`take_due`](Self::take_due)
/// on each poll and purges what comes back.
#[derive(Debug)]
pub struct CleanupScheduler {
    grace: Duration,
    pending: HashMap<CallId, Instant>,
}

impl CleanupScheduler {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            pending: HashMap::new(),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Schedules `call_id` for deletion `grace` after `now`. Scheduling an
    /// already pending call keeps the earlier deadline.
    pub fn schedule(&mut self, call_id: &str, now: Instant) -> Instant {
        let due = now + self.grace;
        *self
            .pending
            .entry(call_id.to_owned())
            .and_modify(|d| *d = (*d).min(due))
            .or_insert(due)
    }

    pub fn cancel(&mut self, call_id: &str) -> bool {
        self.pending.remove(call_id).is_some()
    }

    /// Cancels everything, returning the ids that were pending.
    pub fn cancel_all(&mut self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.pending.drain().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    /// Removes and returns every call whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<CallId> {
        let mut due: Vec<(Instant, CallId)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, id.clone()))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending.contains_key(call_id)
    }

    pub fn pending_ids(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Deletes both candidate sequences of a call, then the call record.
///
/// Every deletion is attempted even if an earlier one fails; the first
/// failure is returned.
pub fn purge_call(store: &dyn SignalingStore, call: &DocPath) -> Result<(), StoreError> {
    let mut first_err = None;
    for set in CandidateSet::ALL {
        let entries = match store.query(&Query::new(set.under(call))) {
            Ok(docs) => docs,
            Err(e) => {
                first_err.get_or_insert(e);
                continue;
            }
        };
        for entry in entries {
            if let Err(e) = store.delete(&entry.path) {
                first_err.get_or_insert(e);
            }
        }
    }
    if let Err(e) = store.delete(call) {
        first_err.get_or_insert(e);
    }
    match first_err {
        None => Ok(()),
        Some(e) => Err(e),
    }
}
