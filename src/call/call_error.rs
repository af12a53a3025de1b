use thiserror::Error;

use crate::call::call_record::CallStatus;
use crate::media::media_error::MediaError;
use crate::negotiation::transport_error::TransportError;
use crate::signaling::store_error::StoreError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("a call is already active in this session")]
    CallInProgress,
    #[error("no active call")]
    NoActiveCall,
    #[error("the caller cannot accept their own call")]
    CannotAcceptOwnCall,
    #[error("call is {0}, expected ringing")]
    NotRinging(CallStatus),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
