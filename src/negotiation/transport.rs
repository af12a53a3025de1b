use std::sync::mpsc::Sender;

use crate::call::call_record::CallId;
use crate::config::IceConfig;
use crate::media::local_stream::{AudioTrack, RemoteTrack};
use crate::negotiation::{
    candidate::IceCandidateInit, session_description::SessionDescription,
    signaling_state::SignalingState, transport_error::TransportError,
};

/// What a transport reports back, tagged with the call it was created for.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LocalCandidate {
        call_id: CallId,
        candidate: IceCandidateInit,
    },
    RemoteTrack {
        call_id: CallId,
        track: RemoteTrack,
    },
}

impl TransportEvent {
    pub fn call_id(&self) -> &str {
        match self {
            TransportEvent::LocalCandidate { call_id, .. }
            | TransportEvent::RemoteTrack { call_id, .. } => call_id,
        }
    }
}

/// One peer connection. Descriptions follow the offer/answer model; remote
/// candidates are only accepted once a remote description is set.
pub trait PeerTransport: Send {
    fn add_track(&mut self, track: &AudioTrack) -> Result<(), TransportError>;

    fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;

    /// Commits a description this side produced. Candidate gathering starts
    /// here; results arrive as [`TransportEvent::LocalCandidate`].
    fn set_local_description(&mut self, desc: &SessionDescription) -> Result<(), TransportError>;

    fn set_remote_description(&mut self, desc: &SessionDescription)
    -> Result<(), TransportError>;

    /// Applying a candidate already applied is a no-op.
    fn add_ice_candidate(&mut self, candidate: &IceCandidateInit) -> Result<(), TransportError>;

    fn signaling_state(&self) -> SignalingState;

    fn has_remote_description(&self) -> bool;

    /// Idempotent.
    fn close(&mut self);
}

pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        call_id: &str,
        ice: &IceConfig,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>, TransportError>;
}
