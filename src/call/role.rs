use crate::call::call_record::{CallRecord, CallStatus};
use crate::signaling::paths::CandidateSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Offerer,
    Answerer,
    None,
}

impl Role {
    /// Candidate sequence this role appends to.
    pub fn local_candidates(self) -> Option<CandidateSet> {
        match self {
            Role::Offerer => Some(CandidateSet::Initiator),
            Role::Answerer => Some(CandidateSet::Responder),
            Role::None => None,
        }
    }

    /// Candidate sequence this role reads from.
    pub fn remote_candidates(self) -> Option<CandidateSet> {
        self.local_candidates().map(CandidateSet::other)
    }
}

/// Structural role of `me` in `call`. The initiator is always the offerer,
/// even if the same identity was also written as responder.
pub fn role(call: &CallRecord, me: &str) -> Role {
    if call.initiator_id == me {
        Role::Offerer
    } else if call.responder_id.as_deref() == Some(me) {
        Role::Answerer
    } else {
        Role::None
    }
}

/// Role `me` should act in for the record as observed now. The offerer acts
/// while the call rings; the answerer once it is connected and an offer has
/// been published.
pub fn acting_role(call: &CallRecord, me: &str) -> Role {
    match (role(call, me), call.status) {
        (Role::Offerer, CallStatus::Ringing) => Role::Offerer,
        (Role::Answerer, CallStatus::Connected) if call.offer.is_some() => Role::Answerer,
        _ => Role::None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::negotiation::session_description::SessionDescription;

    fn record(status: CallStatus, responder: Option<&str>, offer: bool) -> CallRecord {
        CallRecord {
            id: "c1".into(),
            initiator_id: "u-student".into(),
            responder_id: responder.map(str::to_owned),
            status,
            offer: offer.then(|| SessionDescription::offer("v=0\r\n")),
            answer: None,
            created_at: Some(1),
        }
    }

    #[test]
    fn structural_role_is_deterministic() {
        let call = record(CallStatus::Connected, Some("u-counsellor"), true);
        assert_eq!(role(&call, "u-student"), Role::Offerer);
        assert_eq!(role(&call, "u-counsellor"), Role::Answerer);
        assert_eq!(role(&call, "u-other"), Role::None);
    }

    #[test]
    fn no_peer_holds_both_roles() {
        let call = record(CallStatus::Connected, Some("u-student"), true);
        assert_eq!(role(&call, "u-student"), Role::Offerer);
        assert_eq!(acting_role(&call, "u-student"), Role::None);
    }

    #[test]
    fn offerer_acts_only_while_ringing() {
        assert_eq!(
            acting_role(&record(CallStatus::Ringing, None, false), "u-student"),
            Role::Offerer
        );
        assert_eq!(
            acting_role(&record(CallStatus::Connected, Some("u-counsellor"), true), "u-student"),
            Role::None
        );
    }

    #[test]
    fn answerer_waits_for_offer() {
        let no_offer = record(CallStatus::Connected, Some("u-counsellor"), false);
        assert_eq!(acting_role(&no_offer, "u-counsellor"), Role::None);

        let with_offer = record(CallStatus::Connected, Some("u-counsellor"), true);
        assert_eq!(acting_role(&with_offer, "u-counsellor"), Role::Answerer);

        let ended = record(CallStatus::Ended, Some("u-counsellor"), true);
        assert_eq!(acting_role(&ended, "u-counsellor"), Role::None);
    }

    #[test]
    fn candidate_sets_follow_role() {
        assert_eq!(Role::Offerer.local_candidates(), Some(CandidateSet::Initiator));
        assert_eq!(Role::Offerer.remote_candidates(), Some(CandidateSet::Responder));
        assert_eq!(Role::Answerer.local_candidates(), Some(CandidateSet::Responder));
        assert_eq!(Role::None.remote_candidates(), None);
    }
}
