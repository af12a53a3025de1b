use thiserror::Error;

use crate::negotiation::signaling_state::SignalingState;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("{op} not allowed in signaling state {state}")]
    InvalidState {
        op: &'static str,
        state: SignalingState,
    },
    #[error("invalid session description: {0}")]
    InvalidDescription(String),
    #[error("invalid ICE candidate: {0}")]
    InvalidCandidate(String),
    #[error("transport closed")]
    Closed,
}
