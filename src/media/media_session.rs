use std::sync::Arc;

use crate::call::call_record::CallId;
use crate::config::AudioSettings;
use crate::log::log_sink::LogSink;
use crate::media::{
    devices::MediaDevices,
    local_stream::{AudioTrack, LocalStream, RemoteTrack},
    media_error::MediaError,
};
use crate::negotiation::transport::PeerTransport;
use crate::{sink_debug, sink_info};

/// Resources held for the one call this peer is in: the local capture
/// stream, the transport and the remote sink.
pub struct MediaSession {
    call_id: Option<CallId>,
    local: Option<LocalStream>,
    transport: Option<Box<dyn PeerTransport>>,
    remote: Option<RemoteTrack>,
    muted: bool,
    log: Arc<dyn LogSink>,
}

impl MediaSession {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            call_id: None,
            local: None,
            transport: None,
            remote: None,
            muted: false,
            log,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// Acquires the local audio stream for `call_id`. A stream already held
    /// for the same call is reused.
    pub fn acquire(
        &mut self,
        call_id: &str,
        devices: &mut dyn MediaDevices,
        settings: &AudioSettings,
    ) -> Result<&LocalStream, MediaError> {
        if self.call_id.as_deref() != Some(call_id) {
            self.cleanup();
        }
        if self.local.is_none() {
            let stream = devices.acquire_audio(settings)?;
            sink_info!(
                self.log,
                "acquired local stream {} for call {}",
                stream.id(),
                call_id
            );
            self.call_id = Some(call_id.to_owned());
            self.muted = false;
            self.local = Some(stream);
        }
        self.local
            .as_ref()
            .ok_or_else(|| MediaError::Device("local stream vanished".into()))
    }

    pub fn local_tracks(&self) -> &[AudioTrack] {
        match &self.local {
            Some(stream) => stream.audio_tracks(),
            None => &[],
        }
    }

    /// Takes ownership of `transport`, closing any previous one.
    pub fn attach_transport(&mut self, transport: Box<dyn PeerTransport>) {
        if let Some(mut old) = self.transport.replace(transport) {
            old.close();
        }
    }

    pub fn transport_mut(&mut self) -> Option<&mut (dyn PeerTransport + 'static)> {
        self.transport.as_deref_mut()
    }

    pub fn transport(&self) -> Option<&(dyn PeerTransport + 'static)> {
        self.transport.as_deref()
    }

    pub fn attach_remote(&mut self, track: RemoteTrack) {
        sink_debug!(self.log, "remote track {} attached", track.id);
        self.remote = Some(track);
    }

    pub fn remote(&self) -> Option<&RemoteTrack> {
        self.remote.as_ref()
    }

    /// Flips `enabled` on every local audio track and returns whether the
    /// microphone is now muted. Without a local stream nothing changes.
    pub fn toggle_mute(&mut self) -> bool {
        let Some(stream) = &self.local else {
            return self.muted;
        };
        for track in stream.audio_tracks() {
            track.set_enabled(!track.is_enabled());
            self.muted = !track.is_enabled();
        }
        self.muted
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_active(&self) -> bool {
        self.local.is_some() || self.transport.is_some() || self.remote.is_some()
    }

    /// Stops capture, closes the transport, clears the remote sink and
    /// forgets the call. Returns whether anything was held. Safe to call
    /// any number of times.
    pub fn cleanup(&mut self) -> bool {
        let held = self.is_active();
        if let Some(stream) = self.local.take() {
            stream.stop_all();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.remote = None;
        self.muted = false;
        if let Some(call_id) = self.call_id.take() {
            if held {
                sink_info!(self.log, "media for call {} released", call_id);
            }
        }
        held
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::config::IceConfig;
    use crate::log::NoopLogSink;
    use crate::media::devices::FakeDevices;
    use crate::negotiation::{LoopbackFactory, SignalingState, TransportFactory};
    use std::sync::mpsc;

    fn session() -> MediaSession {
        MediaSession::new(Arc::new(NoopLogSink))
    }

    #[test]
    fn toggle_mute_twice_restores_state() {
        let mut devices = FakeDevices::granting();
        let mut media = session();
        media
            .acquire("c1", &mut devices, &AudioSettings::default())
            .unwrap();
        let track = devices.issued()[0].clone();

        assert!(media.toggle_mute());
        assert!(!track.is_enabled());
        assert!(!media.toggle_mute());
        assert!(track.is_enabled());
        assert!(!media.is_muted());
    }

    #[test]
    fn toggle_without_stream_reports_unmuted() {
        let mut media = session();
        assert!(!media.toggle_mute());
        assert!(!media.toggle_mute());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut devices = FakeDevices::granting();
        let factory = LoopbackFactory::new();
        let (tx, _rx) = mpsc::channel();
        let mut media = session();

        media
            .acquire("c1", &mut devices, &AudioSettings::default())
            .unwrap();
        media.attach_transport(factory.create("c1", &IceConfig::default(), tx).unwrap());
        media.attach_remote(RemoteTrack {
            id: "t".into(),
            stream_id: "s".into(),
        });
        media.toggle_mute();

        assert!(media.cleanup());
        assert!(!media.cleanup());
        assert!(!media.is_active());
        assert!(!media.is_muted());
        assert!(media.remote().is_none());
        assert!(devices.issued()[0].is_stopped());
        assert!(factory.stats("c1").unwrap().closed);
    }

    #[test]
    fn acquiring_for_a_new_call_releases_the_old_one() {
        let mut devices = FakeDevices::granting();
        let mut media = session();
        media
            .acquire("c1", &mut devices, &AudioSettings::default())
            .unwrap();
        media
            .acquire("c1", &mut devices, &AudioSettings::default())
            .unwrap();
        assert_eq!(devices.attempts(), 1);

        media
            .acquire("c2", &mut devices, &AudioSettings::default())
            .unwrap();
        assert!(devices.issued()[0].is_stopped());
        assert_eq!(media.call_id(), Some("c2"));
    }

    #[test]
    fn transport_is_reachable_until_cleanup() {
        let factory = LoopbackFactory::new();
        let (tx, _rx) = mpsc::channel();
        let mut media = session();
        media.attach_transport(factory.create("c1", &IceConfig::default(), tx).unwrap());
        assert_eq!(
            media.transport().unwrap().signaling_state(),
            SignalingState::Stable
        );
        media.cleanup();
        assert!(media.transport_mut().is_none());
    }
}
