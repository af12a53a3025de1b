use std::fmt;

use crate::signaling::store_error::StoreError;

const SESSIONS: &str = "sessions";
const CALLS: &str = "calls";

/// Path of a collection: an odd number of `/`-separated segments,
/// e.g. `sessions/s1/calls`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

/// Path of a document: an even number of segments,
/// e.g. `sessions/s1/calls/abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

fn segments(raw: &str) -> Result<Vec<&str>, StoreError> {
    let segs: Vec<&str> = raw.split('/').collect();
    if segs.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(raw.to_owned()));
    }
    Ok(segs)
}

impl CollectionPath {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if segments(raw)?.len() % 2 == 1 {
            Ok(Self(raw.to_owned()))
        } else {
            Err(StoreError::InvalidPath(raw.to_owned()))
        }
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if segments(raw)?.len() % 2 == 0 {
            Ok(Self(raw.to_owned()))
        } else {
            Err(StoreError::InvalidPath(raw.to_owned()))
        }
    }

    /// Last segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_owned()),
            None => CollectionPath(String::new()),
        }
    }

    /// Sub-collection nested under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `sessions/{session_id}/calls`
pub fn calls_collection(session_id: &str) -> CollectionPath {
    CollectionPath(format!("{SESSIONS}/{session_id}/{CALLS}"))
}

/// The two append-only candidate sequences nested under a call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSet {
    /// Candidates discovered by the caller.
    Initiator,
    /// Candidates discovered by the peer that accepted.
    Responder,
}

impl CandidateSet {
    pub const ALL: [CandidateSet; 2] = [CandidateSet::Initiator, CandidateSet::Responder];

    pub fn collection_name(self) -> &'static str {
        match self {
            CandidateSet::Initiator => "offerCandidates",
            CandidateSet::Responder => "answerCandidates",
        }
    }

    pub fn other(self) -> Self {
        match self {
            CandidateSet::Initiator => CandidateSet::Responder,
            CandidateSet::Responder => CandidateSet::Initiator,
        }
    }

    pub fn under(self, call: &DocPath) -> CollectionPath {
        call.collection(self.collection_name())
    }
}
