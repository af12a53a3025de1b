use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::call::call_record::{CallRecord, CallStatus};

/// Identity to display-name lookup for the session's participants.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: HashMap<String, String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, identity: &str, name: &str) -> Self {
        self.insert(identity, name);
        self
    }

    pub fn insert(&mut self, identity: &str, name: &str) {
        self.names.insert(identity.to_owned(), name.to_owned());
    }

    /// Display name, or the identity itself when unknown.
    pub fn name_of<'a>(&'a self, identity: &'a str) -> &'a str {
        self.names.get(identity).map_or(identity, String::as_str)
    }
}

/// Everything the UI needs to render call controls for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallView {
    pub status: Option<CallStatus>,
    /// Ringing and someone else is calling.
    pub incoming_prompt: bool,
    pub show_start_button: bool,
    /// Ringing and this peer is the caller.
    pub ringing_indicator: bool,
    pub in_call: bool,
    pub remote_party: Option<String>,
    pub is_muted: bool,
    pub messaging_enabled: bool,
    /// `MM:SS` since the call connected.
    pub elapsed: Option<String>,
}

impl CallView {
    pub fn build(
        call: Option<&CallRecord>,
        me: &str,
        is_muted: bool,
        roster: &Roster,
        elapsed: Option<Duration>,
    ) -> Self {
        let active = call.filter(|c| !c.status.is_terminal());
        let status = active.map(|c| c.status);
        let ringing = status == Some(CallStatus::Ringing);
        let mine = active.is_some_and(|c| c.initiator_id == me);
        let in_call = status == Some(CallStatus::Connected);

        Self {
            status,
            incoming_prompt: ringing && !mine,
            show_start_button: active.is_none(),
            ringing_indicator: ringing && mine,
            in_call,
            remote_party: active
                .and_then(|c| c.other_party(me))
                .map(|id| roster.name_of(id).to_owned()),
            is_muted,
            messaging_enabled: active.is_none(),
            elapsed: elapsed.filter(|_| in_call).map(format_elapsed),
        }
    }
}

/// Counts from the moment a call connects.
#[derive(Debug, Clone, Default)]
pub struct CallTimer {
    started: Option<Instant>,
}

impl CallTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting a running timer keeps the first start.
    pub fn start(&mut self, now: Instant) {
        self.started.get_or_insert(now);
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.started.map(|s| now.saturating_duration_since(s))
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
