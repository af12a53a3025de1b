use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_millis(1_000);
pub const DEFAULT_STUN_URLS: [&str; 2] = [
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];
pub const DEFAULT_CANDIDATE_POOL_SIZE: u8 = 10;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 48_000;
pub const DEFAULT_CHANNELS: u16 = 1;
/// Below this a 20 ms frame holds no samples.
pub const MIN_SAMPLE_RATE_HZ: u32 = 1_000;
const FRAME_MS: u32 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("error reading config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// INI-style key/value configuration.
///
/// Keys before the first `[Section]` header are globals. `#` starts a comment
/// line and values may be wrapped in double quotes.
#[derive(Debug, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut cfg = Self::empty();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = Some(line[1..line.len() - 1].trim().to_string());
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_string();
                let value = value.trim().trim_matches('"').to_string();
                match &current_section {
                    None => {
                        cfg.globals.insert(key, value);
                    }
                    Some(sec) => {
                        cfg.sections
                            .entry(sec.clone())
                            .or_default()
                            .insert(key, value);
                    }
                }
            }
        }
        cfg
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    /// Parses `[section] key`, falling back to `default` when the key is
    /// missing or empty.
    pub fn parse_or<T: FromStr>(
        &self,
        section: &str,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get_non_empty(section, key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| invalid(section, key, raw)),
        }
    }

    /// Like [`parse_or`](Self::parse_or), but values below `min` are
    /// rejected too.
    pub fn parse_at_least<T: FromStr + PartialOrd>(
        &self,
        section: &str,
        key: &str,
        default: T,
        min: T,
    ) -> Result<T, ConfigError> {
        let value = self.parse_or(section, key, default)?;
        if value < min {
            let raw = self.get(section, key).unwrap_or_default();
            return Err(invalid(section, key, raw));
        }
        Ok(value)
    }
}

fn invalid(section: &str, key: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_owned(),
        key: key.to_owned(),
        value: raw.to_owned(),
    }
}

/// One ICE server entry handed to the transport factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceConfig {
    pub servers: Vec<IceServer>,
    pub candidate_pool_size: u8,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServer {
                urls: DEFAULT_STUN_URLS.iter().map(|u| (*u).to_owned()).collect(),
            }],
            candidate_pool_size: DEFAULT_CANDIDATE_POOL_SIZE,
        }
    }
}

/// Where local audio comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioBackend {
    /// Granted silent track, no hardware.
    #[default]
    Fake,
    /// Default cpal input device.
    Cpal,
}

impl FromStr for AudioBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fake" => Ok(Self::Fake),
            "cpal" => Ok(Self::Cpal),
            _ => Err(()),
        }
    }
}

/// Capture parameters for the local microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub backend: AudioBackend,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            channels: DEFAULT_CHANNELS,
            backend: AudioBackend::default(),
        }
    }
}

impl AudioSettings {
    /// Interleaved samples in one 20 ms frame. Zero for settings
    /// `from_config` would have refused.
    pub fn frame_len(&self) -> usize {
        (self.sample_rate_hz / 1000 * FRAME_MS) as usize * usize::from(self.channels)
    }
}

/// Typed view over [`Config`] for everything the call core needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSettings {
    /// Delay between observing `ended` and deleting the call record.
    pub cleanup_grace: Duration,
    pub ice: IceConfig,
    pub audio: AudioSettings,
    pub log_path: Option<PathBuf>,
    pub log_filename: Option<String>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
            ice: IceConfig::default(),
            audio: AudioSettings::default(),
            log_path: None,
            log_filename: None,
        }
    }
}

impl CallSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let grace_ms: u64 = config.parse_or(
            "Call",
            "cleanup_grace_ms",
            DEFAULT_CLEANUP_GRACE.as_millis() as u64,
        )?;

        let servers = match config.get_non_empty("Ice", "stun_urls") {
            Some(raw) => vec![IceServer {
                urls: raw
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_owned)
                    .collect(),
            }],
            None => IceConfig::default().servers,
        };
        let ice = IceConfig {
            servers,
            candidate_pool_size: config.parse_or(
                "Ice",
                "candidate_pool_size",
                DEFAULT_CANDIDATE_POOL_SIZE,
            )?,
        };

        let audio = AudioSettings {
            sample_rate_hz: config.parse_at_least(
                "Audio",
                "sample_rate_hz",
                DEFAULT_SAMPLE_RATE_HZ,
                MIN_SAMPLE_RATE_HZ,
            )?,
            channels: config.parse_at_least("Audio", "channels", DEFAULT_CHANNELS, 1)?,
            backend: config.parse_or("Audio", "device", AudioBackend::default())?,
        };

        Ok(Self {
            cleanup_grace: Duration::from_millis(grace_ms),
            ice,
            audio,
            log_path: config.get_non_empty("Logging", "log_path").map(expand_path),
            log_filename: config
                .get_non_empty("Logging", "log_filename")
                .map(str::to_owned),
        })
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    if path_str.starts_with('~') {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from);

        if let Some(mut home_path) = home {
            if path_str == "~" {
                return home_path;
            }
            if path_str.starts_with("~/") || path_str.starts_with("~\\") {
                home_path.push(&path_str[2..]);
                return home_path;
            }
        }
    }
    PathBuf::from(path_str)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const SAMPLE: &str = r#"
# demo config
app = "rustycall"

[Call]
cleanup_grace_ms = 250

[Ice]
stun_urls = stun:a.example:3478, stun:b.example:3478
candidate_pool_size = 4

[Logging]
log_path = /tmp/rustycall-logs
log_filename = peer
"#;

    #[test]
    fn parses_sections_and_globals() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get_global("app"), Some("rustycall"));
        assert_eq!(cfg.get("Call", "cleanup_grace_ms"), Some("250"));
        assert_eq!(cfg.get("Call", "missing"), None);
    }

    #[test]
    fn settings_read_typed_values() {
        let settings = CallSettings::from_config(&Config::parse(SAMPLE)).unwrap();
        assert_eq!(settings.cleanup_grace, Duration::from_millis(250));
        assert_eq!(
            settings.ice.servers[0].urls,
            vec!["stun:a.example:3478", "stun:b.example:3478"]
        );
        assert_eq!(settings.ice.candidate_pool_size, 4);
        assert_eq!(settings.audio, AudioSettings::default());
        assert_eq!(settings.log_path, Some(PathBuf::from("/tmp/rustycall-logs")));
        assert_eq!(settings.log_filename.as_deref(), Some("peer"));
    }

    #[test]
    fn empty_config_yields_defaults() {
        let settings = CallSettings::from_config(&Config::empty()).unwrap();
        assert_eq!(settings, CallSettings::default());
        assert_eq!(settings.cleanup_grace, Duration::from_secs(1));
        assert_eq!(settings.ice.candidate_pool_size, 10);
    }

    #[test]
    fn bad_number_is_reported() {
        let cfg = Config::parse("[Call]\ncleanup_grace_ms = soon\n");
        let err = CallSettings::from_config(&cfg).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                section: "Call".into(),
                key: "cleanup_grace_ms".into(),
                value: "soon".into(),
            }
        );
    }

    #[test]
    fn audio_values_that_make_empty_frames_are_refused() {
        for (text, key, value) in [
            ("[Audio]\nsample_rate_hz = 800\n", "sample_rate_hz", "800"),
            ("[Audio]\nchannels = 0\n", "channels", "0"),
        ] {
            let err = CallSettings::from_config(&Config::parse(text)).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidValue {
                    section: "Audio".into(),
                    key: key.into(),
                    value: value.into(),
                }
            );
        }
        let ok = CallSettings::from_config(&Config::parse("[Audio]\nsample_rate_hz = 1000\n"));
        assert_eq!(ok.unwrap().audio.frame_len(), 20);
    }

    #[test]
    fn audio_device_selects_backend() {
        let cfg = Config::parse("[Audio]\ndevice = cpal\n");
        let settings = CallSettings::from_config(&cfg).unwrap();
        assert_eq!(settings.audio.backend, AudioBackend::Cpal);
        assert_eq!(settings.audio.frame_len(), 960);

        let bad = CallSettings::from_config(&Config::parse("[Audio]\ndevice = speaker\n"));
        assert!(matches!(bad, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("/definitely/not/here.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
