//! Negotiation Engine: offer/answer and candidate exchange over the
//! signaling store, plus the transport seam it drives.
pub mod candidate;
pub mod engine;
pub mod loopback;
pub mod session_description;
pub mod signaling_state;
pub mod transport;
pub mod transport_error;

pub use candidate::IceCandidateInit;
pub use engine::NegotiationEngine;
pub use loopback::{LoopbackFactory, LoopbackTransport, TransportStats};
pub use session_description::{SdpType, SessionDescription};
pub use signaling_state::SignalingState;
pub use transport::{PeerTransport, TransportEvent, TransportFactory};
pub use transport_error::TransportError;
