//! Media Session Controller: local audio capture, mute, and teardown of
//! everything one call holds.
pub mod audio_frame;
pub mod cpal_devices;
pub mod devices;
pub mod local_stream;
pub mod media_error;
pub mod media_session;

pub use audio_frame::AudioFrame;
pub use cpal_devices::{CpalMediaDevices, FrameChunker};
pub use devices::{FakeDevices, FakeOutcome, MediaDevices};
pub use local_stream::{AudioTrack, LocalStream, RemoteTrack};
pub use media_error::MediaError;
pub use media_session::MediaSession;
