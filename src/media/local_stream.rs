use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Local audio track. Clones share the same `enabled` and `stopped` flags,
/// so the capture side sees mute and stop immediately.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    id: String,
    label: String,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl AudioTrack {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_owned(),
            label: label.to_owned(),
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Releases the capture. Stopping twice is harmless.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Audio-only capture stream handed out by [`MediaDevices`](crate::media::MediaDevices).
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<AudioTrack>,
}

impl LocalStream {
    pub fn new(id: &str, tracks: Vec<AudioTrack>) -> Self {
        Self {
            id: id.to_owned(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    pub fn stop_all(&self) {
        for t in &self.tracks {
            t.stop();
        }
    }
}

/// Track announced by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_flags() {
        let track = AudioTrack::new("mic", "Microphone");
        let producer_view = track.clone();
        track.set_enabled(false);
        assert!(!producer_view.is_enabled());

        let stream = LocalStream::new("s", vec![track]);
        stream.stop_all();
        stream.stop_all();
        assert!(producer_view.is_stopped());
    }
}
