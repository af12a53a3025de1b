use crate::{
    config::CallSettings,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, TrySendError},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

/// Flush every 100 lines when debugging, so a crash leaves a useful tail.
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

/// Bounded, non-blocking logger writing to a per-process log file.
///
/// Producers call [`LoggerHandle::try_log`] (usually through the `sink_*!`
/// macros). Lines go through a bounded `sync_channel` to a dedicated worker
/// thread that owns the file. When the queue is full the line is dropped;
/// callers never block on disk I/O.
///
/// Warn and Error lines force a flush so a failed call is visible on disk
/// right away.
pub struct Logger {
    handle: LoggerHandle,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Starts the logger where `settings` says, or in `logs/` next to the
    /// executable when no directory is configured.
    #[must_use]
    pub fn from_settings(settings: &CallSettings, cap: usize) -> Self {
        let app_name = settings.log_filename.as_deref();
        match &settings.log_path {
            Some(dir) => Self::start_in_dir(dir, app_name, cap),
            None => Self::start_default(app_name, cap),
        }
    }

    /// Creates `logs/` next to the executable and logs there.
    ///
    /// # Example Filename
    /// `target/debug/logs/call_demo-20251102_023045-pid1234.log`
    #[must_use]
    pub fn start_default(app_name: Option<&str>, cap: usize) -> Self {
        let base = exe_dir_fallback_cwd().join("logs");
        Self::start_in_dir(base, app_name, cap)
    }

    /// Starts the logger in `dir`, creating it if missing.
    ///
    /// The file name is `<app_name>-<timestamp>-pid<pid>.log`, so two peers
    /// started from the same binary never share a file.
    pub fn start_in_dir<D: AsRef<Path>>(dir: D, app_name: Option<&str>, cap: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let ts = timestamp_for_filename();
        let pid = std::process::id();
        let fname = match app_name {
            Some(name) => format!("{name}-{ts}-pid{pid}.log"),
            None => format!("{ts}-pid{pid}.log"),
        };
        let file_path = dir.join(fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let worker_path = file_path.clone();

        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || {
                // Target file -> temp file -> sink. Never panic.
                let writer: Box<dyn Write + Send> = if let Ok(f) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&worker_path)
                {
                    Box::new(f)
                } else {
                    let fallback = std::env::temp_dir().join("rustycall-fallback.log");
                    match OpenOptions::new().create(true).append(true).open(&fallback) {
                        Ok(f) => Box::new(f),
                        Err(_) => Box::new(io::sink()),
                    }
                };
                let mut out = BufWriter::new(writer);
                let mut lines_written: u32 = 0;

                while let Ok(m) = rx.recv() {
                    let _ = writeln!(&mut out, "{m}");
                    lines_written = lines_written.wrapping_add(1);

                    if matches!(m.level, LogLevel::Warn | LogLevel::Error)
                        || lines_written.is_multiple_of(FLUSH_BATCH_SIZE)
                    {
                        let _ = out.flush();
                    }
                }
                let _ = out.flush();
            })
            .ok();

        Self {
            handle: LoggerHandle { tx },
            _thread,
            file_path,
        }
    }

    /// Enqueues a line without blocking; drops it if the queue is full.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.handle.try_log(level, text, target)
    }

    /// Cloneable sink to hand to controllers and workers.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Directory of the executable (target/{debug,release}), or the cwd.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// `YYYYMMDD_HHMMSS` in UTC, e.g. `20251102_023045`.
fn timestamp_for_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    unix_to_utc(secs).map_or_else(
        |_| format!("unix_{secs}"),
        |tm| {
            format!(
                "{:04}{:02}{:02}_{:02}{:02}{:02}",
                tm.year, tm.mon, tm.day, tm.hour, tm.min, tm.sec
            )
        },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SimpleUtc {
    year: i32,
    mon: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
}

#[derive(Debug)]
enum UtcConvError {
    Year,
    Month,
    Day,
}

/// Civil-from-days conversion of a UNIX timestamp, so we don't pull in a
/// date crate just to name a file.
#[allow(clippy::many_single_char_names)]
fn unix_to_utc(mut s: u64) -> Result<SimpleUtc, UtcConvError> {
    let sec = (s % 60) as u32;
    s /= 60;
    let min = (s % 60) as u32;
    s /= 60;
    let hour = (s % 24) as u32;
    s /= 24;

    let z: i128 = i128::from(s) + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = mp + if mp < 10 { 3 } else { -9 }; // [1, 12]

    let year = i32::try_from(y + i128::from(m <= 2)).map_err(|_| UtcConvError::Year)?;
    let mon = u32::try_from(m).map_err(|_| UtcConvError::Month)?;
    let day = u32::try_from(d).map_err(|_| UtcConvError::Day)?;

    Ok(SimpleUtc {
        year,
        mon,
        day,
        hour,
        min,
        sec,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn unix_epoch_is_first_of_january_1970() {
        let tm = unix_to_utc(0).unwrap();
        assert_eq!(
            tm,
            SimpleUtc {
                year: 1970,
                mon: 1,
                day: 1,
                hour: 0,
                min: 0,
                sec: 0
            }
        );
    }

    #[test]
    fn leap_day_is_converted() {
        // 2024-02-29T12:34:56Z
        let tm = unix_to_utc(1_709_210_096).unwrap();
        assert_eq!((tm.year, tm.mon, tm.day), (2024, 2, 29));
        assert_eq!((tm.hour, tm.min, tm.sec), (12, 34, 56));
    }

    #[test]
    fn logger_writes_lines_to_its_file() {
        let dir = std::env::temp_dir().join(format!("rustycall-log-test-{}", std::process::id()));
        let logger = Logger::start_in_dir(&dir, Some("unit"), 16);
        logger
            .try_log(LogLevel::Warn, "store unavailable", "rustycall::tests")
            .expect("queue has room");
        let path = logger.file_path().to_path_buf();
        drop(logger);

        // The worker flushes Warn lines immediately; give it a moment to run.
        let mut content = String::new();
        for _ in 0..50 {
            content = fs::read_to_string(&path).unwrap_or_default();
            if content.contains("store unavailable") {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(content.contains("[WARN]"));
        assert!(content.contains("store unavailable"));
        let _ = fs::remove_dir_all(&dir);
    }
}
