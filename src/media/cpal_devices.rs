use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::AudioSettings;
use crate::log::log_sink::LogSink;
use crate::media::{
    audio_frame::AudioFrame,
    devices::MediaDevices,
    local_stream::{AudioTrack, LocalStream},
    media_error::MediaError,
};
use crate::utils::now_millis;
use crate::{sink_debug, sink_info, sink_warn};

const STOP_POLL: Duration = Duration::from_millis(50);
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Microphone capture through the host's default cpal input device.
///
/// Each acquisition spawns one capture thread that owns the cpal stream.
/// While the track is disabled the thread emits zeroed frames; once the
/// track is stopped the stream is dropped and the thread exits.
pub struct CpalMediaDevices {
    log: Arc<dyn LogSink>,
    frames: Option<Sender<AudioFrame>>,
    next_id: u32,
}

impl CpalMediaDevices {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            frames: None,
            next_id: 1,
        }
    }

    /// Sends captured frames to `tx` instead of discarding them.
    #[must_use]
    pub fn with_frame_sink(mut self, tx: Sender<AudioFrame>) -> Self {
        self.frames = Some(tx);
        self
    }
}

impl MediaDevices for CpalMediaDevices {
    fn acquire_audio(&mut self, settings: &AudioSettings) -> Result<LocalStream, MediaError> {
        let chunker = FrameChunker::new(*settings)?;
        let n = self.next_id;
        self.next_id += 1;
        let track = AudioTrack::new(&format!("mic-{n}"), "Default microphone");

        let (ready_tx, ready_rx) = mpsc::channel();
        let worker_track = track.clone();
        let log = self.log.clone();
        let frames = self.frames.clone();
        let settings = *settings;

        thread::Builder::new()
            .name("rustycall-audio-capture".into())
            .spawn(move || run_capture(worker_track, settings, chunker, frames, ready_tx, log))
            .map_err(|e| MediaError::Device(format!("spawn capture thread: {e}")))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(LocalStream::new(&format!("local-{n}"), vec![track])),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                track.stop();
                Err(MediaError::Device("capture did not start in time".into()))
            }
        }
    }
}

fn run_capture(
    track: AudioTrack,
    settings: AudioSettings,
    mut chunker: FrameChunker,
    frames: Option<Sender<AudioFrame>>,
    ready: Sender<Result<(), MediaError>>,
    log: Arc<dyn LogSink>,
) {
    let device = match cpal::default_host().default_input_device() {
        Some(d) => d,
        None => {
            let _ = ready.send(Err(MediaError::NoDevice));
            return;
        }
    };
    sink_info!(
        log,
        "[AudioCapture] using input device {}",
        device.name().unwrap_or_default()
    );

    let config = cpal::StreamConfig {
        channels: settings.channels,
        sample_rate: cpal::SampleRate(settings.sample_rate_hz),
        buffer_size: cpal::BufferSize::Default,
    };
    let cb_track = track.clone();
    let err_log = log.clone();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for frame in chunker.push(data, cb_track.is_enabled(), now_millis()) {
                if let Some(tx) = &frames {
                    let _ = tx.send(frame);
                }
            }
        },
        move |err: cpal::StreamError| {
            sink_warn!(err_log, "[AudioCapture] stream error: {}", err);
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(cpal::BuildStreamError::DeviceNotAvailable) => {
            let _ = ready.send(Err(MediaError::NoDevice));
            return;
        }
        Err(e) => {
            let _ = ready.send(Err(MediaError::Device(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(MediaError::Device(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));
    sink_debug!(log, "[AudioCapture] {} started", track.id());

    while !track.is_stopped() {
        thread::sleep(STOP_POLL);
    }
    drop(stream);
    sink_debug!(log, "[AudioCapture] {} stopped", track.id());
}

/// Cuts captured samples into fixed 20 ms frames. Input taken while the
/// track is disabled is replaced by silence of the same length.
pub struct FrameChunker {
    settings: AudioSettings,
    frame_len: usize,
    buf: VecDeque<f32>,
}

impl FrameChunker {
    pub fn new(settings: AudioSettings) -> Result<Self, MediaError> {
        let frame_len = settings.frame_len();
        if frame_len == 0 {
            return Err(MediaError::Device(format!(
                "no samples per frame at {} Hz x {} channels",
                settings.sample_rate_hz, settings.channels
            )));
        }
        Ok(Self {
            settings,
            frame_len,
            buf: VecDeque::with_capacity(frame_len * 2),
        })
    }

    /// Samples held back until the next full frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, data: &[f32], enabled: bool, timestamp_ms: u128) -> Vec<AudioFrame> {
        if enabled {
            self.buf.extend(data.iter().copied());
        } else {
            self.buf.extend(std::iter::repeat_n(0.0, data.len()));
        }
        let mut out = Vec::new();
        while self.buf.len() >= self.frame_len {
            let chunk: Vec<f32> = self.buf.drain(..self.frame_len).collect();
            out.push(AudioFrame {
                data: Arc::new(chunk),
                samples: self.frame_len / usize::from(self.settings.channels),
                sample_rate: self.settings.sample_rate_hz,
                channels: self.settings.channels,
                timestamp_ms,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn stereo_8k() -> AudioSettings {
        AudioSettings {
            sample_rate_hz: 8_000,
            channels: 2,
            ..AudioSettings::default()
        }
    }

    #[test]
    fn splits_into_whole_frames_and_keeps_the_rest() {
        let mut chunker = FrameChunker::new(stereo_8k()).unwrap();
        // 160 samples per channel, interleaved.
        let frames = chunker.push(&[0.5; 400], true, 7);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.len(), 320);
        assert_eq!(frames[0].samples, 160);
        assert_eq!(frames[0].timestamp_ms, 7);
        assert!(!frames[0].is_silent());
        assert_eq!(chunker.pending(), 80);

        let frames = chunker.push(&[0.5; 240], true, 8);
        assert_eq!(frames.len(), 1);
        assert_eq!(chunker.pending(), 0);
    }

    #[test]
    fn disabled_track_yields_silence() {
        let mut chunker = FrameChunker::new(stereo_8k()).unwrap();
        let frames = chunker.push(&[0.9; 320], false, 0);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_silent());

        let frames = chunker.push(&[0.9; 320], true, 1);
        assert!(!frames[0].is_silent());
    }

    #[test]
    fn settings_without_samples_are_refused() {
        let zero_channels = AudioSettings {
            channels: 0,
            ..AudioSettings::default()
        };
        let too_slow = AudioSettings {
            sample_rate_hz: 800,
            ..AudioSettings::default()
        };
        for settings in [zero_channels, too_slow] {
            assert!(matches!(
                FrameChunker::new(settings),
                Err(MediaError::Device(_))
            ));
        }
    }

    #[test]
    fn acquire_refuses_bad_settings_before_opening_a_device() {
        let mut devices = CpalMediaDevices::new(Arc::new(crate::log::NoopLogSink));
        let settings = AudioSettings {
            channels: 0,
            ..AudioSettings::default()
        };
        assert!(matches!(
            devices.acquire_audio(&settings),
            Err(MediaError::Device(_))
        ));
    }
}
