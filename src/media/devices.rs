use std::sync::{Arc, Mutex};

use crate::config::AudioSettings;
use crate::media::{
    local_stream::{AudioTrack, LocalStream},
    media_error::MediaError,
};

/// Source of local capture streams.
pub trait MediaDevices: Send {
    fn acquire_audio(&mut self, settings: &AudioSettings) -> Result<LocalStream, MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutcome {
    Grant,
    Deny,
    NoDevice,
}

/// Scripted [`MediaDevices`] for tests and the demo. Every track it hands
/// out stays observable through [`issued`](Self::issued).
#[derive(Debug, Clone)]
pub struct FakeDevices {
    outcome: Arc<Mutex<FakeOutcome>>,
    issued: Arc<Mutex<Vec<AudioTrack>>>,
    attempts: Arc<Mutex<usize>>,
}

impl FakeDevices {
    pub fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            issued: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(0)),
        }
    }

    pub fn granting() -> Self {
        Self::new(FakeOutcome::Grant)
    }

    pub fn denying() -> Self {
        Self::new(FakeOutcome::Deny)
    }

    pub fn set_outcome(&self, outcome: FakeOutcome) {
        if let Ok(mut o) = self.outcome.lock() {
            *o = outcome;
        }
    }

    pub fn issued(&self) -> Vec<AudioTrack> {
        self.issued.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|n| *n).unwrap_or_default()
    }
}

impl MediaDevices for FakeDevices {
    fn acquire_audio(&mut self, _settings: &AudioSettings) -> Result<LocalStream, MediaError> {
        let attempt = match self.attempts.lock() {
            Ok(mut n) => {
                *n += 1;
                *n
            }
            Err(_) => 0,
        };
        let outcome = self
            .outcome
            .lock()
            .map(|o| *o)
            .unwrap_or(FakeOutcome::NoDevice);
        match outcome {
            FakeOutcome::Deny => Err(MediaError::PermissionDenied),
            FakeOutcome::NoDevice => Err(MediaError::NoDevice),
            FakeOutcome::Grant => {
                let track = AudioTrack::new(&format!("fake-mic-{attempt}"), "Fake microphone");
                if let Ok(mut issued) = self.issued.lock() {
                    issued.push(track.clone());
                }
                Ok(LocalStream::new(&format!("fake-stream-{attempt}"), vec![track]))
            }
        }
    }
}
