use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no audio input device")]
    NoDevice,
    #[error("audio device error: {0}")]
    Device(String),
}
