use std::sync::Arc;

/// One block of captured samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved f32 samples.
    pub data: Arc<Vec<f32>>,
    /// Samples per channel.
    pub samples: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Capture time, milliseconds since the epoch.
    pub timestamp_ms: u128,
}

impl AudioFrame {
    pub fn is_silent(&self) -> bool {
        self.data.iter().all(|s| *s == 0.0)
    }
}
