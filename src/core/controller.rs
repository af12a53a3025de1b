use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

use crate::call::{
    call_error::CallError,
    call_record::{CallId, CallRecord, CallStatus},
    cleanup::{CleanupScheduler, purge_call},
    lifecycle::{CallLifecycle, Transition},
};
use crate::config::CallSettings;
use crate::core::{
    call_view::{CallTimer, CallView, Roster},
    notice::CallNotice,
};
use crate::log::log_sink::LogSink;
use crate::media::{devices::MediaDevices, media_session::MediaSession};
use crate::negotiation::{
    engine::NegotiationEngine,
    transport::{TransportEvent, TransportFactory},
};
use crate::signaling::{document::StoreNotification, store::SignalingStore};
use crate::{sink_debug, sink_info, sink_warn};

/// One peer's view of calling in one session.
///
/// Commands (`start_call`, `accept_call`, ...) write to the store and return.
/// Everything else happens in [`poll_at`](Self::poll_at): store
/// notifications and transport events are drained, turned into state
/// transitions, due cleanups run, and the notices produced are handed back.
pub struct CallController {
    session_id: String,
    local_id: String,
    store: Arc<dyn SignalingStore>,
    lifecycle: CallLifecycle,
    engine: NegotiationEngine,
    media: MediaSession,
    devices: Box<dyn MediaDevices>,
    cleanup: CleanupScheduler,
    timer: CallTimer,
    store_rx: Receiver<StoreNotification>,
    transport_rx: Receiver<TransportEvent>,
    notices: Vec<CallNotice>,
    log: Arc<dyn LogSink>,
}

impl CallController {
    /// Joins `session_id` as `local_id` and starts watching its calls.
    pub fn new(
        session_id: &str,
        local_id: &str,
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn TransportFactory>,
        devices: Box<dyn MediaDevices>,
        settings: &CallSettings,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, CallError> {
        let (store_tx, store_rx) = mpsc::channel();
        let (transport_tx, transport_rx) = mpsc::channel();

        let mut lifecycle = CallLifecycle::new(session_id, local_id, store.clone(), log.clone());
        lifecycle.watch(store_tx.clone())?;
        let engine = NegotiationEngine::new(
            local_id,
            store.clone(),
            factory,
            settings,
            store_tx,
            transport_tx,
            log.clone(),
        );
        sink_info!(log, "{} joined session {}", local_id, session_id);

        Ok(Self {
            session_id: session_id.to_owned(),
            local_id: local_id.to_owned(),
            store,
            lifecycle,
            engine,
            media: MediaSession::new(log.clone()),
            devices,
            cleanup: CleanupScheduler::new(settings.cleanup_grace),
            timer: CallTimer::new(),
            store_rx,
            transport_rx,
            notices: Vec::new(),
            log,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The active call as last observed.
    pub fn call(&self) -> Option<&CallRecord> {
        self.lifecycle.current()
    }

    pub fn is_muted(&self) -> bool {
        self.media.is_muted()
    }

    pub fn media(&self) -> &MediaSession {
        &self.media
    }

    pub fn pending_cleanups(&self) -> Vec<CallId> {
        self.cleanup.pending_ids()
    }

    pub fn view(&self, roster: &Roster) -> CallView {
        self.view_at(Instant::now(), roster)
    }

    pub fn view_at(&self, now: Instant, roster: &Roster) -> CallView {
        CallView::build(
            self.lifecycle.current(),
            &self.local_id,
            self.media.is_muted(),
            roster,
            self.timer.elapsed(now),
        )
    }

    pub fn start_call(&mut self) -> Result<CallId, CallError> {
        let r = self.lifecycle.start_call();
        self.report(r)
    }

    pub fn accept_call(&mut self) -> Result<(), CallError> {
        let r = self.lifecycle.accept_call().map(|_| ());
        self.report(r)
    }

    pub fn reject_call(&mut self) -> Result<(), CallError> {
        self.reject_call_at(Instant::now())
    }

    pub fn reject_call_at(&mut self, now: Instant) -> Result<(), CallError> {
        let r = self.lifecycle.reject_call();
        let record = self.report(r)?;
        self.finish(&record, now);
        self.notices.push(CallNotice::CallDeclined);
        Ok(())
    }

    pub fn end_call(&mut self) -> Result<(), CallError> {
        self.end_call_at(Instant::now())
    }

    /// Marks the call ended and tears down local resources right away,
    /// without waiting for the store to echo the change.
    pub fn end_call_at(&mut self, now: Instant) -> Result<(), CallError> {
        let r = self.lifecycle.end_call();
        let record = self.report(r)?;
        self.finish(&record, now);
        Ok(())
    }

    /// Returns the new mute state.
    pub fn toggle_mute(&mut self) -> bool {
        let muted = self.media.toggle_mute();
        sink_debug!(self.log, "{} muted={}", self.local_id, muted);
        muted
    }

    /// Ends the active call if there is one, drops every subscription and
    /// deletes finished calls still waiting for their grace delay.
    pub fn leave_session(&mut self) {
        if self.lifecycle.current().is_some() {
            if let Err(e) = self.end_call() {
                sink_warn!(
                    self.log,
                    "{} leaving session {} with the call still active: {}",
                    self.local_id,
                    self.session_id,
                    e
                );
            }
        }
        self.lifecycle.unwatch();
        self.engine.teardown();
        self.media.cleanup();
        for call_id in self.cleanup.cancel_all() {
            self.purge(&call_id);
        }
        sink_info!(self.log, "{} left session {}", self.local_id, self.session_id);
    }

    pub fn poll(&mut self) -> Vec<CallNotice> {
        self.poll_at(Instant::now())
    }

    /// Drains both event channels until neither has anything left, then
    /// runs the cleanups due at `now`.
    pub fn poll_at(&mut self, now: Instant) -> Vec<CallNotice> {
        loop {
            let mut progressed = false;
            while let Ok(note) = self.store_rx.try_recv() {
                progressed = true;
                self.on_store_notification(&note, now);
            }
            while let Ok(event) = self.transport_rx.try_recv() {
                progressed = true;
                if let Err(e) = self.engine.on_transport_event(event, &mut self.media) {
                    self.fail("transport event", e);
                }
            }
            if !progressed {
                break;
            }
        }

        for call_id in self.cleanup.take_due(now) {
            self.purge(&call_id);
        }
        std::mem::take(&mut self.notices)
    }

    fn on_store_notification(&mut self, note: &StoreNotification, now: Instant) {
        if self.lifecycle.is_watch(note.subscription) {
            for transition in self.lifecycle.on_snapshot(&note.snapshot) {
                self.apply(transition, now);
            }
            return;
        }
        match self.engine.on_notification(note, &mut self.media) {
            Ok(true) => {}
            Ok(false) => sink_debug!(
                self.log,
                "stale notification for subscription {}",
                note.subscription
            ),
            Err(e) => self.fail("store notification", e),
        }
    }

    fn apply(&mut self, transition: Transition, now: Instant) {
        match transition {
            Transition::Updated { from, record } => {
                if from.is_none() {
                    // A new call supersedes any finished one still waiting.
                    for call_id in self.cleanup.cancel_all() {
                        self.purge(&call_id);
                    }
                    if record.status == CallStatus::Ringing && record.initiator_id != self.local_id
                    {
                        self.notices.push(CallNotice::IncomingCall {
                            from: record.initiator_id.clone(),
                        });
                    }
                }
                if record.status == CallStatus::Connected {
                    self.timer.start(now);
                }
                let call_doc = self.lifecycle.call_doc(&record.id);
                if let Err(e) =
                    self.engine
                        .on_call(&call_doc, &record, &mut self.media, self.devices.as_mut())
                {
                    self.fail("negotiation", e);
                }
            }
            Transition::Ended(record) => {
                sink_info!(self.log, "call {} ended remotely", record.id);
                self.finish(&record, now);
                self.notices.push(CallNotice::CallEnded {
                    call_id: record.id.clone(),
                });
            }
        }
    }

    fn finish(&mut self, record: &CallRecord, now: Instant) {
        self.engine.teardown();
        self.media.cleanup();
        self.timer.stop();
        self.cleanup.schedule(&record.id, now);
    }

    fn purge(&mut self, call_id: &str) {
        let call_doc = self.lifecycle.call_doc(call_id);
        match purge_call(self.store.as_ref(), &call_doc) {
            Ok(()) => {
                sink_debug!(self.log, "call {} purged", call_id);
                self.lifecycle.forget(call_id);
                self.engine.forget(call_id);
            }
            Err(e) => sink_warn!(self.log, "cleanup of call {} failed: {}", call_id, e),
        }
    }

    pub fn remembers(&self, call_id: &str) -> bool {
        self.lifecycle.is_finished(call_id) || self.engine.is_halted(call_id)
    }

    fn report<T>(&mut self, result: Result<T, CallError>) -> Result<T, CallError> {
        if let Err(e) = &result {
            sink_warn!(self.log, "{}: command failed: {}", self.local_id, e);
            self.notices.push(notice_for(e));
        }
        result
    }

    fn fail(&mut self, context: &str, e: CallError) {
        sink_warn!(self.log, "{}: {} failed: {}", self.local_id, context, e);
        self.notices.push(notice_for(&e));
    }
}

fn notice_for(e: &CallError) -> CallNotice {
    match e {
        CallError::CallInProgress => CallNotice::CallInProgress,
        CallError::Media(_) => CallNotice::MicrophoneRequired,
        other => CallNotice::Failure(other.to_string()),
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.lifecycle.unwatch();
        self.engine.teardown();
    }
}
