use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};

use crate::call::call_record::CallId;
use crate::config::IceConfig;
use crate::media::local_stream::{AudioTrack, RemoteTrack};
use crate::negotiation::{
    candidate::IceCandidateInit,
    session_description::{SdpType, SessionDescription},
    signaling_state::SignalingState,
    transport::{PeerTransport, TransportEvent, TransportFactory},
    transport_error::TransportError,
};

const UFRAG_LEN: usize = 4;
const PWD_LEN: usize = 22;
const OPUS_PT: u8 = 111;
/// Host candidates gathered per transport, capped by the configured pool.
const HOST_CANDIDATES: usize = 2;

/// What a [`LoopbackTransport`] has done, readable from tests and the demo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub local_candidates: usize,
    pub remote_candidates: Vec<String>,
    pub duplicate_candidates: usize,
    pub local_description: Option<SdpType>,
    pub remote_description: Option<SdpType>,
    pub tracks: usize,
    pub closed: bool,
}

type StatsMap = Arc<Mutex<HashMap<CallId, TransportStats>>>;

fn lock_stats(stats: &StatsMap) -> MutexGuard<'_, HashMap<CallId, TransportStats>> {
    match stats.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Creates [`LoopbackTransport`]s and keeps their stats per call id. Two
/// peers sharing one factory see the merged stats of both their transports.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    stats: StatsMap,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, call_id: &str) -> Option<TransportStats> {
        lock_stats(&self.stats).get(call_id).cloned()
    }

    pub fn created(&self) -> usize {
        lock_stats(&self.stats).len()
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(
        &self,
        call_id: &str,
        ice: &IceConfig,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        lock_stats(&self.stats)
            .entry(call_id.to_owned())
            .or_default();
        Ok(Box::new(LoopbackTransport::new(
            call_id,
            ice,
            events,
            self.stats.clone(),
        )))
    }
}

/// Deterministic in-process transport.
///
/// Produces real-looking audio SDP, gathers loopback host candidates when a
/// local description is committed, and reports a remote track when a remote
/// description with an audio section and an `msid` is applied. No packets
/// are ever sent.
pub struct LoopbackTransport {
    call_id: CallId,
    events: Sender<TransportEvent>,
    stats: StatsMap,
    state: SignalingState,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    tracks: Vec<AudioTrack>,
    stream_id: String,
    ufrag: String,
    pwd: String,
    fingerprint: String,
    candidate_budget: usize,
    gathered: bool,
    applied: Vec<IceCandidateInit>,
}

impl LoopbackTransport {
    fn new(call_id: &str, ice: &IceConfig, events: Sender<TransportEvent>, stats: StatsMap) -> Self {
        Self {
            call_id: call_id.to_owned(),
            events,
            stats,
            state: SignalingState::Stable,
            local: None,
            remote: None,
            tracks: Vec::new(),
            stream_id: gen_token(12),
            ufrag: gen_token(UFRAG_LEN),
            pwd: gen_token(PWD_LEN),
            fingerprint: gen_fingerprint(),
            candidate_budget: HOST_CANDIDATES.min(usize::from(ice.candidate_pool_size).max(1)),
            gathered: false,
            applied: Vec::new(),
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut TransportStats)) {
        let mut map = lock_stats(&self.stats);
        f(map.entry(self.call_id.clone()).or_default());
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.state == SignalingState::Closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn invalid(&self, op: &'static str) -> TransportError {
        TransportError::InvalidState {
            op,
            state: self.state,
        }
    }

    fn build_sdp(&self, setup: &str) -> String {
        let mut sdp = String::new();
        let session_id: u64 = rand::thread_rng().r#gen::<u32>().into();
        let _ = write!(sdp, "v=0\r\n");
        let _ = write!(sdp, "o=- {session_id} 2 IN IP4 127.0.0.1\r\n");
        let _ = write!(sdp, "s=-\r\nt=0 0\r\n");
        let _ = write!(sdp, "a=group:BUNDLE 0\r\n");
        let _ = write!(sdp, "a=msid-semantic: WMS {}\r\n", self.stream_id);
        let _ = write!(sdp, "m=audio 9 UDP/TLS/RTP/SAVPF {OPUS_PT}\r\n");
        let _ = write!(sdp, "c=IN IP4 0.0.0.0\r\n");
        let _ = write!(sdp, "a=ice-ufrag:{}\r\n", self.ufrag);
        let _ = write!(sdp, "a=ice-pwd:{}\r\n", self.pwd);
        let _ = write!(sdp, "a=fingerprint:sha-256 {}\r\n", self.fingerprint);
        let _ = write!(sdp, "a=setup:{setup}\r\n");
        let _ = write!(sdp, "a=mid:0\r\n");
        if self.tracks.is_empty() {
            let _ = write!(sdp, "a=recvonly\r\n");
        } else {
            let _ = write!(sdp, "a=sendrecv\r\n");
            for t in &self.tracks {
                let _ = write!(sdp, "a=msid:{} {}\r\n", self.stream_id, t.id());
            }
        }
        let _ = write!(sdp, "a=rtcp-mux\r\n");
        let _ = write!(sdp, "a=rtpmap:{OPUS_PT} opus/48000/2\r\n");
        sdp
    }

    fn gather(&mut self) {
        if self.gathered {
            return;
        }
        self.gathered = true;
        let mut rng = rand::thread_rng();
        for i in 0..self.candidate_budget {
            let port: u16 = rng.gen_range(49_152..=65_535);
            let local_pref = u16::MAX - u16::try_from(i).unwrap_or(0);
            let candidate = IceCandidateInit::host(
                &(i + 1).to_string(),
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                port,
                local_pref,
                &self.ufrag,
            );
            let sent = self.events.send(TransportEvent::LocalCandidate {
                call_id: self.call_id.clone(),
                candidate,
            });
            if sent.is_ok() {
                self.with_stats(|s| s.local_candidates += 1);
            }
        }
    }
}

impl PeerTransport for LoopbackTransport {
    fn add_track(&mut self, track: &AudioTrack) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !self.tracks.iter().any(|t| t.id() == track.id()) {
            self.tracks.push(track.clone());
            let n = self.tracks.len();
            self.with_stats(|s| s.tracks = n);
        }
        Ok(())
    }

    fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        if self.state != SignalingState::Stable {
            return Err(self.invalid("create_offer"));
        }
        Ok(SessionDescription::offer(self.build_sdp("actpass")))
    }

    fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        if self.state != SignalingState::HaveRemoteOffer {
            return Err(self.invalid("create_answer"));
        }
        Ok(SessionDescription::answer(self.build_sdp("active")))
    }

    fn set_local_description(&mut self, desc: &SessionDescription) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.state = match (desc.kind, self.state) {
            (SdpType::Offer, SignalingState::Stable) => SignalingState::HaveLocalOffer,
            (SdpType::Answer, SignalingState::HaveRemoteOffer) => SignalingState::Stable,
            _ => return Err(self.invalid("set_local_description")),
        };
        self.local = Some(desc.clone());
        let kind = desc.kind;
        self.with_stats(|s| s.local_description = Some(kind));
        self.gather();
        Ok(())
    }

    fn set_remote_description(&mut self, desc: &SessionDescription) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !desc.sdp.starts_with("v=0") {
            return Err(TransportError::InvalidDescription(
                "missing version line".into(),
            ));
        }
        self.state = match (desc.kind, self.state) {
            (SdpType::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
            (SdpType::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
            _ => return Err(self.invalid("set_remote_description")),
        };
        self.remote = Some(desc.clone());
        let kind = desc.kind;
        self.with_stats(|s| s.remote_description = Some(kind));

        if desc.media_kinds().contains(&"audio") {
            if let Some((stream_id, track_id)) = desc.msid() {
                let _ = self.events.send(TransportEvent::RemoteTrack {
                    call_id: self.call_id.clone(),
                    track: RemoteTrack {
                        id: track_id.to_owned(),
                        stream_id: stream_id.to_owned(),
                    },
                });
            }
        }
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidateInit) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.remote.is_none() {
            return Err(self.invalid("add_ice_candidate"));
        }
        if !candidate.is_well_formed() {
            return Err(TransportError::InvalidCandidate(candidate.candidate.clone()));
        }
        if self.applied.contains(candidate) {
            self.with_stats(|s| s.duplicate_candidates += 1);
            return Ok(());
        }
        self.applied.push(candidate.clone());
        let line = candidate.candidate.clone();
        self.with_stats(|s| s.remote_candidates.push(line));
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.state
    }

    fn has_remote_description(&self) -> bool {
        self.remote.is_some()
    }

    fn close(&mut self) {
        if self.state == SignalingState::Closed {
            return;
        }
        self.state = SignalingState::Closed;
        self.tracks.clear();
        self.with_stats(|s| s.closed = true);
    }
}

fn gen_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Colon-separated SHA-256 of a throwaway certificate body.
fn gen_fingerprint() -> String {
    let mut cert = [0u8; 64];
    rand::thread_rng().fill(&mut cert[..]);
    let digest = Sha256::digest(cert);
    digest
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::sync::mpsc::{self, Receiver};

    fn transport(call: &str) -> (LoopbackFactory, Box<dyn PeerTransport>, Receiver<TransportEvent>) {
        let factory = LoopbackFactory::new();
        let (tx, rx) = mpsc::channel();
        let t = factory.create(call, &IceConfig::default(), tx).unwrap();
        (factory, t, rx)
    }

    #[test]
    fn offer_answer_reaches_stable_on_both_sides() {
        let (_f, mut offerer, orx) = transport("c1");
        let (_g, mut answerer, arx) = transport("c1");
        let track = AudioTrack::new("mic-1", "Microphone");
        offerer.add_track(&track).unwrap();
        answerer.add_track(&AudioTrack::new("mic-2", "Microphone")).unwrap();

        let offer = offerer.create_offer().unwrap();
        assert!(offer.sdp.contains("a=fingerprint:sha-256 "));
        offerer.set_local_description(&offer).unwrap();
        assert_eq!(offerer.signaling_state(), SignalingState::HaveLocalOffer);

        answerer.set_remote_description(&offer).unwrap();
        assert_eq!(answerer.signaling_state(), SignalingState::HaveRemoteOffer);
        let answer = answerer.create_answer().unwrap();
        answerer.set_local_description(&answer).unwrap();
        offerer.set_remote_description(&answer).unwrap();

        assert_eq!(offerer.signaling_state(), SignalingState::Stable);
        assert_eq!(answerer.signaling_state(), SignalingState::Stable);

        let offer_events: Vec<_> = orx.try_iter().collect();
        assert_eq!(
            offer_events
                .iter()
                .filter(|e| matches!(e, TransportEvent::LocalCandidate { .. }))
                .count(),
            HOST_CANDIDATES
        );
        assert!(offer_events.iter().any(
            |e| matches!(e, TransportEvent::RemoteTrack { track, .. } if track.id == "mic-2")
        ));
        assert!(arx.try_iter().any(
            |e| matches!(e, TransportEvent::RemoteTrack { track, .. } if track.id == "mic-1")
        ));
    }

    #[test]
    fn answer_without_offer_is_invalid_state() {
        let (_f, mut t, _rx) = transport("c1");
        assert_eq!(
            t.create_answer(),
            Err(TransportError::InvalidState {
                op: "create_answer",
                state: SignalingState::Stable
            })
        );
    }

    #[test]
    fn candidates_need_remote_description_and_dedupe() {
        let (factory, mut t, _rx) = transport("c1");
        let cand = IceCandidateInit::host("1", IpAddr::V4(Ipv4Addr::LOCALHOST), 5000, 1, "u");
        assert!(matches!(
            t.add_ice_candidate(&cand),
            Err(TransportError::InvalidState { .. })
        ));

        let (_g, mut other, _orx) = transport("c2");
        let offer = other.create_offer().unwrap();
        t.set_remote_description(&offer).unwrap();
        t.add_ice_candidate(&cand).unwrap();
        t.add_ice_candidate(&cand).unwrap();

        let stats = factory.stats("c1").unwrap();
        assert_eq!(stats.remote_candidates.len(), 1);
        assert_eq!(stats.duplicate_candidates, 1);
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let (factory, mut t, _rx) = transport("c1");
        t.close();
        t.close();
        assert_eq!(t.signaling_state(), SignalingState::Closed);
        assert_eq!(t.create_offer(), Err(TransportError::Closed));
        assert!(factory.stats("c1").unwrap().closed);
    }

    #[test]
    fn fingerprint_is_32_hex_pairs() {
        let fp = gen_fingerprint();
        assert_eq!(fp.split(':').count(), 32);
        assert!(fp.split(':').all(|p| p.len() == 2));
    }
}
