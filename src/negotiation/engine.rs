use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::call::{
    call_error::CallError,
    call_record::{CallId, CallRecord},
    role::{Role, acting_role},
};
use crate::config::{AudioSettings, CallSettings, IceConfig};
use crate::log::log_sink::LogSink;
use crate::media::{devices::MediaDevices, media_session::MediaSession};
use crate::negotiation::{
    candidate::IceCandidateInit,
    session_description::SessionDescription,
    signaling_state::SignalingState,
    transport::{PeerTransport, TransportEvent, TransportFactory},
    transport_error::TransportError,
};
use crate::signaling::{
    document::{Fields, StoreNotification, to_fields},
    paths::{CandidateSet, DocPath},
    query::{Query, Watch},
    store::{SignalingStore, SubscriptionId},
    store_error::StoreError,
};
use crate::{sink_debug, sink_info, sink_warn};

/// Per-call negotiation state. Lives from the moment this peer starts acting
/// in a role until the call is torn down.
struct Negotiation {
    call_id: CallId,
    call_doc: DocPath,
    role: Role,
    record_sub: Option<SubscriptionId>,
    candidates_sub: Option<SubscriptionId>,
    /// Remote candidate entries already taken, by document id.
    seen: HashSet<String>,
    /// Remote candidates that arrived before the remote description.
    queued: Vec<IceCandidateInit>,
}

impl Negotiation {
    fn new(call_id: &str, call_doc: DocPath, role: Role) -> Self {
        Self {
            call_id: call_id.to_owned(),
            call_doc,
            role,
            record_sub: None,
            candidates_sub: None,
            seen: HashSet::new(),
            queued: Vec::new(),
        }
    }

    fn subscriptions(&self) -> impl Iterator<Item = SubscriptionId> + '_ {
        self.record_sub.iter().chain(self.candidates_sub.iter()).copied()
    }
}

/// Runs the offer/answer and candidate exchange for this peer.
///
/// The engine is the only writer of a call's `offer` / `answer` fields and
/// candidate sequences. It reacts to the call record through
/// [`on_call`](Self::on_call) and to its own subscriptions and transport
/// events through [`on_notification`](Self::on_notification) and
/// [`on_transport_event`](Self::on_transport_event).
pub struct NegotiationEngine {
    local_id: String,
    store: Arc<dyn SignalingStore>,
    factory: Arc<dyn TransportFactory>,
    ice: IceConfig,
    audio: AudioSettings,
    store_tx: Sender<StoreNotification>,
    transport_tx: Sender<TransportEvent>,
    active: Option<Negotiation>,
    halted: HashSet<CallId>,
    log: Arc<dyn LogSink>,
}

impl NegotiationEngine {
    pub fn new(
        local_id: &str,
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn TransportFactory>,
        settings: &CallSettings,
        store_tx: Sender<StoreNotification>,
        transport_tx: Sender<TransportEvent>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            local_id: local_id.to_owned(),
            store,
            factory,
            ice: settings.ice.clone(),
            audio: settings.audio,
            store_tx,
            transport_tx,
            active: None,
            halted: HashSet::new(),
            log,
        }
    }

    /// Call id and role of the negotiation in progress.
    pub fn negotiating(&self) -> Option<(&str, Role)> {
        self.active.as_ref().map(|n| (n.call_id.as_str(), n.role))
    }

    pub fn is_halted(&self, call_id: &str) -> bool {
        self.halted.contains(call_id)
    }

    /// Drops what the engine remembers about a call that no longer exists.
    pub fn forget(&mut self, call_id: &str) {
        self.halted.remove(call_id);
    }

    pub fn owns(&self, id: SubscriptionId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|n| n.subscriptions().any(|s| s == id))
    }

    /// Reacts to the latest observed call record. Starts the offerer or
    /// answerer protocol the first time this peer's acting role becomes
    /// known; does nothing otherwise.
    ///
    /// A failure halts negotiation for that call for good: subscriptions are
    /// dropped and later transport events for it are ignored. The call itself
    /// is left as it is in the store.
    pub fn on_call(
        &mut self,
        call_doc: &DocPath,
        record: &CallRecord,
        media: &mut MediaSession,
        devices: &mut dyn MediaDevices,
    ) -> Result<(), CallError> {
        let acting = acting_role(record, &self.local_id);
        if acting == Role::None || self.halted.contains(&record.id) {
            return Ok(());
        }
        match self.active.as_ref().map(|n| n.call_id == record.id) {
            Some(true) => return Ok(()),
            Some(false) => self.teardown(),
            None => {}
        }

        sink_info!(
            self.log,
            "{} negotiating call {} as {:?}",
            self.local_id,
            record.id,
            acting
        );
        self.active = Some(Negotiation::new(&record.id, call_doc.clone(), acting));
        let started = match acting {
            Role::Offerer => self.start_offerer(call_doc, record, media, devices),
            Role::Answerer => self.start_answerer(call_doc, record, media, devices),
            Role::None => Ok(()),
        };
        if let Err(e) = &started {
            sink_warn!(self.log, "negotiation for call {} halted: {}", record.id, e);
            self.halted.insert(record.id.clone());
            self.teardown();
        }
        started
    }

    fn open_transport(
        &mut self,
        record: &CallRecord,
        media: &mut MediaSession,
        devices: &mut dyn MediaDevices,
    ) -> Result<(), CallError> {
        media.acquire(&record.id, devices, &self.audio)?;
        let mut transport = self
            .factory
            .create(&record.id, &self.ice, self.transport_tx.clone())?;
        for track in media.local_tracks() {
            transport.add_track(track)?;
        }
        media.attach_transport(transport);
        Ok(())
    }

    fn start_offerer(
        &mut self,
        call_doc: &DocPath,
        record: &CallRecord,
        media: &mut MediaSession,
        devices: &mut dyn MediaDevices,
    ) -> Result<(), CallError> {
        self.open_transport(record, media, devices)?;
        let transport = media.transport_mut().ok_or(TransportError::Closed)?;

        let offer = transport.create_offer()?;
        transport.set_local_description(&offer)?;
        self.store
            .update(call_doc, description_fields("offer", &offer)?)?;
        sink_debug!(self.log, "offer published for call {}", record.id);

        let record_sub = self
            .store
            .subscribe(Watch::Document(call_doc.clone()), self.store_tx.clone())?;
        let candidates_sub = self.store.subscribe(
            Watch::Query(Query::new(CandidateSet::Responder.under(call_doc))),
            self.store_tx.clone(),
        )?;
        if let Some(n) = self.active.as_mut() {
            n.record_sub = Some(record_sub);
            n.candidates_sub = Some(candidates_sub);
        }
        Ok(())
    }

    fn start_answerer(
        &mut self,
        call_doc: &DocPath,
        record: &CallRecord,
        media: &mut MediaSession,
        devices: &mut dyn MediaDevices,
    ) -> Result<(), CallError> {
        let offer = record.offer.as_ref().ok_or_else(|| {
            TransportError::InvalidDescription("call record carries no offer".into())
        })?;
        self.open_transport(record, media, devices)?;
        let transport = media.transport_mut().ok_or(TransportError::Closed)?;

        transport.set_remote_description(offer)?;
        let answer = transport.create_answer()?;
        transport.set_local_description(&answer)?;
        self.store
            .update(call_doc, description_fields("answer", &answer)?)?;
        sink_debug!(self.log, "answer published for call {}", record.id);

        let candidates_sub = self.store.subscribe(
            Watch::Query(Query::new(CandidateSet::Initiator.under(call_doc))),
            self.store_tx.clone(),
        )?;
        if let Some(n) = self.active.as_mut() {
            n.candidates_sub = Some(candidates_sub);
        }
        Ok(())
    }

    /// Handles a notification from one of the engine's own subscriptions.
    /// Returns `Ok(false)` when the subscription is not the engine's.
    pub fn on_notification(
        &mut self,
        note: &StoreNotification,
        media: &mut MediaSession,
    ) -> Result<bool, CallError> {
        let Some(n) = self.active.as_mut() else {
            return Ok(false);
        };

        if n.record_sub == Some(note.subscription) {
            let Some(doc) = note.snapshot.first() else {
                return Ok(true);
            };
            let record = CallRecord::from_document(doc)?;
            let (Some(answer), Some(transport)) = (record.answer.as_ref(), media.transport_mut())
            else {
                return Ok(true);
            };
            // Only the first answer counts; later echoes of the record find
            // the transport already stable.
            if transport.signaling_state() == SignalingState::HaveLocalOffer {
                transport.set_remote_description(answer)?;
                sink_debug!(self.log, "answer applied for call {}", n.call_id);
                flush_queued(n, transport, &self.log)?;
            }
            return Ok(true);
        }

        if n.candidates_sub == Some(note.subscription) {
            let mut first_err: Option<CallError> = None;
            for doc in note.snapshot.added() {
                if !n.seen.insert(doc.id().to_owned()) {
                    continue;
                }
                let candidate: IceCandidateInit = match doc.decode() {
                    Ok(c) => c,
                    Err(e) => {
                        sink_warn!(self.log, "skipping candidate {}: {}", doc.path, e);
                        first_err.get_or_insert(e.into());
                        continue;
                    }
                };
                match media.transport_mut() {
                    Some(t) if t.has_remote_description() => {
                        if let Err(e) = t.add_ice_candidate(&candidate) {
                            sink_warn!(self.log, "candidate {} rejected: {}", doc.path, e);
                            first_err.get_or_insert(e.into());
                        }
                    }
                    Some(_) => n.queued.push(candidate),
                    None => {}
                }
            }
            return match first_err {
                None => Ok(true),
                Some(e) => Err(e),
            };
        }

        Ok(false)
    }

    /// Publishes local candidates and attaches remote tracks for the call
    /// being negotiated. Events for any other call are dropped.
    pub fn on_transport_event(
        &mut self,
        event: TransportEvent,
        media: &mut MediaSession,
    ) -> Result<(), CallError> {
        let Some(n) = &self.active else {
            return Ok(());
        };
        if event.call_id() != n.call_id || self.halted.contains(&n.call_id) {
            return Ok(());
        }
        match event {
            TransportEvent::LocalCandidate { candidate, .. } => {
                let Some(set) = n.role.local_candidates() else {
                    return Ok(());
                };
                self.store
                    .create(&set.under(&n.call_doc), to_fields(&candidate)?)?;
            }
            TransportEvent::RemoteTrack { track, .. } => media.attach_remote(track),
        }
        Ok(())
    }

    fn unsubscribe_all(&mut self) {
        if let Some(n) = self.active.as_mut() {
            for id in n.subscriptions().collect::<Vec<_>>() {
                self.store.unsubscribe(id);
            }
            n.record_sub = None;
            n.candidates_sub = None;
        }
    }

    /// Drops every subscription and forgets the negotiation. Transport and
    /// capture belong to the [`MediaSession`] and are released there.
    pub fn teardown(&mut self) {
        self.unsubscribe_all();
        if let Some(n) = self.active.take() {
            sink_debug!(self.log, "negotiation for call {} torn down", n.call_id);
        }
    }
}

fn description_fields(field: &str, desc: &SessionDescription) -> Result<Fields, StoreError> {
    let value =
        serde_json::to_value(desc).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
    let mut fields = Fields::new();
    fields.insert(field.to_owned(), value);
    Ok(fields)
}

/// Applies every queued candidate. A rejected one is logged and does not
/// stop the rest; the first rejection is returned.
fn flush_queued(
    n: &mut Negotiation,
    transport: &mut dyn PeerTransport,
    log: &Arc<dyn LogSink>,
) -> Result<(), TransportError> {
    let mut first_err = None;
    for candidate in std::mem::take(&mut n.queued) {
        if let Err(e) = transport.add_ice_candidate(&candidate) {
            sink_warn!(log, "queued candidate for call {} rejected: {}", n.call_id, e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        None => Ok(()),
        Some(e) => Err(e),
    }
}
