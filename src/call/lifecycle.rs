use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use serde_json::{Value, json};

use crate::call::{
    call_error::CallError,
    call_record::{CallId, CallRecord, CallStatus},
};
use crate::log::log_sink::LogSink;
use crate::signaling::{
    document::{Fields, Snapshot, StoreNotification},
    paths::{CollectionPath, DocPath, calls_collection},
    query::{Direction, Query, Watch},
    store::{SignalingStore, SubscriptionId, server_timestamp},
};
use crate::{sink_debug, sink_info, sink_warn};

/// Externally visible change of the session's active call.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A call appeared (`from == None`) or its record changed.
    Updated {
        from: Option<CallStatus>,
        record: CallRecord,
    },
    /// The call left the active set. The record carries status `ended`.
    Ended(CallRecord),
}

/// Owns the status machine of the session's single active call.
///
/// Commands write to the store and return; the resulting state arrives later
/// through [`on_snapshot`](Self::on_snapshot), fed from the one watch this
/// manager keeps on the session's calls collection.
pub struct CallLifecycle {
    local_id: String,
    calls: CollectionPath,
    store: Arc<dyn SignalingStore>,
    subscription: Option<SubscriptionId>,
    current: Option<CallRecord>,
    finished: HashSet<CallId>,
    log: Arc<dyn LogSink>,
}

impl CallLifecycle {
    pub fn new(
        session_id: &str,
        local_id: &str,
        store: Arc<dyn SignalingStore>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            local_id: local_id.to_owned(),
            calls: calls_collection(session_id),
            store,
            subscription: None,
            current: None,
            finished: HashSet::new(),
            log,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn calls(&self) -> &CollectionPath {
        &self.calls
    }

    pub fn call_doc(&self, call_id: &str) -> DocPath {
        self.calls.doc(call_id)
    }

    pub fn current(&self) -> Option<&CallRecord> {
        self.current.as_ref()
    }

    pub fn is_finished(&self, call_id: &str) -> bool {
        self.finished.contains(call_id)
    }

    /// Drops a finished call once its record is gone from the store.
    pub fn forget(&mut self, call_id: &str) {
        self.finished.remove(call_id);
    }

    /// Non-terminal calls, earliest first, at most one.
    pub fn active_query(&self) -> Query {
        Query::new(self.calls.clone())
            .where_in(
                "status",
                CallStatus::ACTIVE
                    .iter()
                    .map(|s| Value::from(s.as_str()))
                    .collect(),
            )
            .order_by("createdAt", Direction::Asc)
            .limit(1)
    }

    /// Starts watching the active call. Calling it again keeps the existing
    /// subscription.
    pub fn watch(&mut self, tx: Sender<StoreNotification>) -> Result<SubscriptionId, CallError> {
        if let Some(id) = self.subscription {
            return Ok(id);
        }
        let id = self
            .store
            .subscribe(Watch::Query(self.active_query()), tx)?;
        sink_debug!(self.log, "watching {} as subscription {}", self.calls, id);
        self.subscription = Some(id);
        Ok(id)
    }

    pub fn is_watch(&self, id: SubscriptionId) -> bool {
        self.subscription == Some(id)
    }

    pub fn unwatch(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
    }

    /// `idle -> ringing`. Refuses when the store already holds a ringing or
    /// connected call for this session. The check is a plain read before the
    /// write, so two peers starting at once can both succeed.
    pub fn start_call(&mut self) -> Result<CallId, CallError> {
        if !self.store.query(&self.active_query())?.is_empty() {
            return Err(CallError::CallInProgress);
        }
        let mut fields = Fields::new();
        fields.insert("initiatorId".into(), json!(self.local_id));
        fields.insert("status".into(), json!(CallStatus::Ringing.as_str()));
        fields.insert("createdAt".into(), server_timestamp());

        let path = self.store.create(&self.calls, fields)?;
        sink_info!(self.log, "{} started call {}", self.local_id, path.id());
        Ok(path.id().to_owned())
    }

    /// `ringing -> connected`, by anyone but the initiator.
    pub fn accept_call(&mut self) -> Result<CallId, CallError> {
        let call = self.current.as_ref().ok_or(CallError::NoActiveCall)?;
        if call.status != CallStatus::Ringing {
            return Err(CallError::NotRinging(call.status));
        }
        if call.initiator_id == self.local_id {
            return Err(CallError::CannotAcceptOwnCall);
        }
        let call_id = call.id.clone();

        let mut fields = Fields::new();
        fields.insert("status".into(), json!(CallStatus::Connected.as_str()));
        fields.insert("responderId".into(), json!(self.local_id));
        self.store.update(&self.call_doc(&call_id), fields)?;

        sink_info!(self.log, "{} accepted call {}", self.local_id, call_id);
        Ok(call_id)
    }

    /// `ringing -> ended`. Returns the finished record so the caller can
    /// tear down without waiting for the store to echo it.
    pub fn reject_call(&mut self) -> Result<CallRecord, CallError> {
        let status = self
            .current
            .as_ref()
            .ok_or(CallError::NoActiveCall)?
            .status;
        if status != CallStatus::Ringing {
            return Err(CallError::NotRinging(status));
        }
        let record = self.finish_current()?;
        sink_info!(self.log, "{} rejected call {}", self.local_id, record.id);
        Ok(record)
    }

    /// `ringing | connected -> ended`.
    pub fn end_call(&mut self) -> Result<CallRecord, CallError> {
        let record = self.finish_current()?;
        sink_info!(self.log, "{} ended call {}", self.local_id, record.id);
        Ok(record)
    }

    fn finish_current(&mut self) -> Result<CallRecord, CallError> {
        let call_id = self
            .current
            .as_ref()
            .ok_or(CallError::NoActiveCall)?
            .id
            .clone();

        let mut fields = Fields::new();
        fields.insert("status".into(), json!(CallStatus::Ended.as_str()));
        self.store.update(&self.call_doc(&call_id), fields)?;

        let mut record = self.current.take().ok_or(CallError::NoActiveCall)?;
        record.status = CallStatus::Ended;
        self.finished.insert(record.id.clone());
        Ok(record)
    }

    /// Folds one snapshot of the active-call watch into the state machine.
    ///
    /// Calls this peer already saw finish are never resurrected by a
    /// snapshot that was queued before the end.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> Vec<Transition> {
        let observed = match snapshot.first().map(CallRecord::from_document).transpose() {
            Ok(rec) => rec.filter(|r| !self.finished.contains(&r.id)),
            Err(e) => {
                sink_warn!(self.log, "ignoring unreadable call record: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        match (self.current.take(), observed) {
            (None, None) => {}
            (None, Some(record)) => {
                sink_debug!(self.log, "call {} observed as {}", record.id, record.status);
                out.push(Transition::Updated {
                    from: None,
                    record: record.clone(),
                });
                self.current = Some(record);
            }
            (Some(cur), Some(record)) if cur.id == record.id => {
                if cur != record {
                    if cur.status != record.status {
                        sink_debug!(
                            self.log,
                            "call {}: {} -> {}",
                            record.id,
                            cur.status,
                            record.status
                        );
                    }
                    out.push(Transition::Updated {
                        from: Some(cur.status),
                        record: record.clone(),
                    });
                }
                self.current = Some(record);
            }
            (Some(cur), next) => {
                out.push(Transition::Ended(self.retire(cur)));
                if let Some(record) = next {
                    sink_debug!(self.log, "call {} observed as {}", record.id, record.status);
                    out.push(Transition::Updated {
                        from: None,
                        record: record.clone(),
                    });
                    self.current = Some(record);
                }
            }
        }
        out
    }

    fn retire(&mut self, mut record: CallRecord) -> CallRecord {
        sink_debug!(self.log, "call {}: {} -> ended", record.id, record.status);
        record.status = CallStatus::Ended;
        self.finished.insert(record.id.clone());
        record
    }

    /// Forgets the active call without writing anything.
    pub fn reset(&mut self) -> Option<CallRecord> {
        self.current.take().map(|r| self.retire(r))
    }
}
