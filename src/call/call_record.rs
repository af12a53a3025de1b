use std::fmt;

use serde::{Deserialize, Serialize};

use crate::negotiation::session_description::SessionDescription;
use crate::signaling::{document::Document, store_error::StoreError};

pub type CallId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Connected,
    Ended,
}

impl CallStatus {
    /// Statuses matched by the session's active-call watch.
    pub const ACTIVE: [CallStatus; 2] = [CallStatus::Ringing, CallStatus::Connected];

    pub fn is_terminal(self) -> bool {
        self == CallStatus::Ended
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call in a session, as stored under `sessions/{sid}/calls/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    #[serde(skip)]
    pub id: CallId,
    pub initiator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_id: Option<String>,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    /// Store-assigned, milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl CallRecord {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut record: CallRecord = doc.decode()?;
        record.id = doc.id().to_owned();
        Ok(record)
    }

    pub fn involves(&self, identity: &str) -> bool {
        self.initiator_id == identity || self.responder_id.as_deref() == Some(identity)
    }

    /// The participant that is not `identity`, if known.
    pub fn other_party(&self, identity: &str) -> Option<&str> {
        if self.initiator_id == identity {
            self.responder_id.as_deref()
        } else {
            Some(self.initiator_id.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::negotiation::session_description::SdpType;
    use crate::signaling::{document::to_fields, paths::DocPath};
    use serde_json::json;

    #[test]
    fn decodes_wire_fields() {
        let fields = json!({
            "initiatorId": "u-student",
            "status": "ringing",
            "createdAt": 1_700_000_000_000u64,
            "offer": { "type": "offer", "sdp": "v=0\r\n" },
        });
        let doc = Document::new(
            DocPath::parse("sessions/s1/calls/c1").unwrap(),
            fields.as_object().unwrap().clone(),
        );

        let record = CallRecord::from_document(&doc).unwrap();
        assert_eq!(record.id, "c1");
        assert_eq!(record.status, CallStatus::Ringing);
        assert_eq!(record.responder_id, None);
        assert_eq!(record.offer.unwrap().kind, SdpType::Offer);
        assert_eq!(record.created_at, Some(1_700_000_000_000));
    }

    #[test]
    fn encoding_skips_id_and_empty_fields() {
        let record = CallRecord {
            id: "c1".into(),
            initiator_id: "u-student".into(),
            responder_id: None,
            status: CallStatus::Ringing,
            offer: None,
            answer: None,
            created_at: None,
        };
        let fields = to_fields(&record).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("status"), Some(&json!("ringing")));
    }

    #[test]
    fn unknown_status_is_invalid() {
        let doc = Document::new(
            DocPath::parse("sessions/s1/calls/c1").unwrap(),
            json!({ "initiatorId": "a", "status": "paused" })
                .as_object()
                .unwrap()
                .clone(),
        );
        assert!(matches!(
            CallRecord::from_document(&doc),
            Err(StoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn other_party_from_each_side() {
        let record = CallRecord {
            id: "c1".into(),
            initiator_id: "a".into(),
            responder_id: Some("b".into()),
            status: CallStatus::Connected,
            offer: None,
            answer: None,
            created_at: None,
        };
        assert_eq!(record.other_party("a"), Some("b"));
        assert_eq!(record.other_party("b"), Some("a"));
        assert!(record.involves("b"));
        assert!(!record.involves("c"));
    }
}
