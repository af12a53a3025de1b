use std::sync::Mutex;

use crate::log::{log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink};
use crate::utils::now_millis;

/// Keeps every line in memory. Handy for asserting on warnings in tests and
/// for the demo binary's end-of-run dump.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<LogMsg>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn lines(&self) -> Vec<LogMsg> {
        match self.lines.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|m| m.level == level && m.text.contains(needle))
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let line = LogMsg::new(level, msg, target, now_millis());
        match self.lines.lock() {
            Ok(mut guard) => guard.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sink_info, sink_warn};
    use std::sync::Arc;

    #[test]
    fn records_lines_with_level_and_target() {
        let sink = Arc::new(MemoryLogSink::new());
        sink_warn!(sink, "cleanup of {} failed", "call-1");
        sink_info!(sink, "started");

        assert!(sink.contains(LogLevel::Warn, "cleanup of call-1 failed"));
        assert!(!sink.contains(LogLevel::Info, "cleanup"));
        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].target.contains("memory_log_sink"));
    }
}
