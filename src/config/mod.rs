//! Configuration snapshot for the guard daemons.
//!
//! The backing file is a flat `KEY=value` list at [`DEFAULT_CONFIG_PATH`].
//! Every load produces a fresh, immutable [`GuardConfig`]; nothing holds a
//! long-lived copy, so edits made out-of-process are picked up on the next
//! reconciliation.
//!
//! Loading never fails. A missing or unreadable file yields defaults, and
//! unknown keys, malformed lines and unparsable numbers are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::pattern::{PatternMatcher, DEFAULT_PATTERN};

/// Well-known location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/torrent-guard.conf";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "TORRENT_GUARD_CONFIG";

/// Access log watched when `LOG_PATH` is not set.
pub const DEFAULT_LOG_PATH: &str = "/usr/local/x-ui/access.log";

const DEFAULT_PAUSE_SECS: i64 = 15;
const DEFAULT_SLEEP_SECS: i64 = 5;
const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// Errors from writing the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Key is not one of the recognised configuration keys.
    #[error("unknown config key '{0}'")]
    UnknownKey(String),
    /// Value cannot be stored in a single `KEY=value` line.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Key being written.
        key: ConfigKey,
        /// Why the value was rejected.
        reason: &'static str,
    },
    /// Reading or writing the file failed.
    #[error("config file {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Recognised configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Seconds the protected service stays stopped per pause.
    PauseSec,
    /// Reconciliation interval in seconds.
    SleepSec,
    /// Minimum seconds between two pauses.
    CooldownSec,
    /// Feature flag for the iptables detector.
    EnableIptables,
    /// Feature flag for the log watcher.
    EnableLogwatch,
    /// Access log to follow.
    LogPath,
    /// Signature pattern.
    LogRegex,
}

impl ConfigKey {
    /// All keys in the order they are rendered.
    pub const ALL: [ConfigKey; 7] = [
        Self::PauseSec,
        Self::SleepSec,
        Self::CooldownSec,
        Self::EnableIptables,
        Self::EnableLogwatch,
        Self::LogPath,
        Self::LogRegex,
    ];

    /// Key as it appears in the file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PauseSec => "PAUSE_SEC",
            Self::SleepSec => "SLEEP_SEC",
            Self::CooldownSec => "COOLDOWN_SEC",
            Self::EnableIptables => "ENABLE_IPTABLES",
            Self::EnableLogwatch => "ENABLE_LOGWATCH",
            Self::LogPath => "LOG_PATH",
            Self::LogRegex => "LOG_REGEX",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_owned()))
    }
}

/// One immutable view of the configuration file.
#[derive(Debug, Clone, Serialize)]
pub struct GuardConfig {
    /// Seconds the protected service stays stopped per pause.
    pub pause_secs: i64,
    /// Reconciliation interval in seconds.
    pub sleep_secs: i64,
    /// Minimum seconds between two pauses; `<= 0` disables the cooldown.
    pub cooldown_secs: i64,
    /// Feature flag for the iptables detector.
    pub enable_iptables: bool,
    /// Whether the log watcher should run.
    pub enable_logwatch: bool,
    /// Access log to follow.
    pub log_path: PathBuf,
    /// Signature pattern as written in the file.
    pub log_regex_raw: String,
    /// Compiled signature, `None` when `log_regex_raw` failed to compile.
    #[serde(skip)]
    pub log_regex: Option<PatternMatcher>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            pause_secs: DEFAULT_PAUSE_SECS,
            sleep_secs: DEFAULT_SLEEP_SECS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            enable_iptables: true,
            enable_logwatch: true,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            log_regex_raw: DEFAULT_PATTERN.to_owned(),
            log_regex: PatternMatcher::compile(DEFAULT_PATTERN).ok(),
        }
    }
}

impl GuardConfig {
    /// How long a pause keeps the service stopped.
    pub fn pause_duration(&self) -> Duration {
        secs_to_duration(self.pause_secs)
    }

    /// Reconciliation and tail-restart interval.
    pub fn sleep_duration(&self) -> Duration {
        secs_to_duration(self.sleep_secs)
    }

    /// Minimum spacing between pauses; zero when disabled.
    pub fn cooldown_duration(&self) -> Duration {
        secs_to_duration(self.cooldown_secs)
    }

    /// Whether switching from `self` to `other` requires re-opening the tail.
    pub fn tail_changed(&self, other: &GuardConfig) -> bool {
        self.enable_logwatch != other.enable_logwatch
            || self.log_path != other.log_path
            || self.log_regex_raw != other.log_regex_raw
    }

    /// Raw value of `key` as it would be written to the file.
    pub fn value_of(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::PauseSec => self.pause_secs.to_string(),
            ConfigKey::SleepSec => self.sleep_secs.to_string(),
            ConfigKey::CooldownSec => self.cooldown_secs.to_string(),
            ConfigKey::EnableIptables => self.enable_iptables.to_string(),
            ConfigKey::EnableLogwatch => self.enable_logwatch.to_string(),
            ConfigKey::LogPath => self.log_path.display().to_string(),
            ConfigKey::LogRegex => self.log_regex_raw.clone(),
        }
    }

    /// Render every key as `KEY=value` lines.
    pub fn render(&self) -> String {
        ConfigKey::ALL
            .into_iter()
            .map(|key| format!("{key}={}\n", self.value_of(key)))
            .collect()
    }

    fn apply(&mut self, key: ConfigKey, val: &str) {
        match key {
            ConfigKey::PauseSec => parse_secs(val, &mut self.pause_secs),
            ConfigKey::SleepSec => parse_secs(val, &mut self.sleep_secs),
            ConfigKey::CooldownSec => parse_secs(val, &mut self.cooldown_secs),
            ConfigKey::EnableIptables => self.enable_iptables = parse_flag(val),
            ConfigKey::EnableLogwatch => self.enable_logwatch = parse_flag(val),
            ConfigKey::LogPath => self.log_path = PathBuf::from(val),
            ConfigKey::LogRegex => self.log_regex_raw = val.to_owned(),
        }
    }
}

/// Source of configuration snapshots, consulted on every reconciliation.
pub trait ConfigSource: Send + Sync {
    /// Produce a fresh snapshot.
    fn load(&self) -> GuardConfig;
}

/// [`ConfigSource`] that re-reads a file on every call.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Create a source backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> GuardConfig {
        load_config(&self.path)
    }
}

/// Parse file contents into a snapshot, starting from defaults.
pub fn parse_config(contents: &str) -> GuardConfig {
    let mut config = GuardConfig::default();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        match key.trim().parse::<ConfigKey>() {
            Ok(key) => config.apply(key, val.trim()),
            Err(_) => debug!(key = key.trim(), "ignoring unknown config key"),
        }
    }

    config.log_regex = match PatternMatcher::compile(&config.log_regex_raw) {
        Ok(matcher) => Some(matcher),
        Err(e) => {
            warn!(pattern = %config.log_regex_raw, error = %e, "LOG_REGEX does not compile");
            None
        }
    };

    config
}

/// Load a snapshot from `path`, falling back to defaults when unreadable.
pub fn load_config(path: &Path) -> GuardConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => GuardConfig::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config, using defaults");
            GuardConfig::default()
        }
    }
}

/// Set `key` to `value` in the file at `path`.
///
/// Existing `KEY=` lines are rewritten in place, comments and unrelated
/// lines are preserved, and the key is appended when absent. The file is
/// created if it does not exist. Returns the `KEY=value` line written.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownKey`] for unrecognised keys,
/// [`ConfigError::InvalidValue`] for multi-line values, and
/// [`ConfigError::Io`] when the file cannot be read or written.
pub fn set_key(path: &Path, key: &str, value: &str) -> Result<String, ConfigError> {
    let key: ConfigKey = key.trim().parse()?;
    if value.contains(['\n', '\r']) {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "value must be a single line",
        });
    }

    let existing = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let value = value.trim();
    let updated = rewrite_key(&existing, key, value);
    std::fs::write(path, updated).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(format!("{key}={value}"))
}

fn rewrite_key(contents: &str, key: ConfigKey, value: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut found = false;

    for line in contents.lines() {
        let is_key = line
            .split_once('=')
            .is_some_and(|(k, _)| k.trim() == key.as_str());
        if is_key {
            out.push_str(&format!("{key}={value}"));
            found = true;
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    if !found {
        out.push_str(&format!("{key}={value}\n"));
    }
    out
}

fn parse_secs(val: &str, slot: &mut i64) {
    match val.parse::<i64>() {
        Ok(v) => *slot = v,
        Err(_) => debug!(value = val, "ignoring non-integer duration"),
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

fn secs_to_duration(secs: i64) -> Duration {
    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}
