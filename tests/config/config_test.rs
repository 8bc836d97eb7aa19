//! Coverage for config parsing, loading and key writes.

use std::path::PathBuf;
use std::time::Duration;

use torrent_guard::config::{
    load_config, parse_config, set_key, ConfigError, ConfigKey, ConfigSource, FileConfigSource,
    GuardConfig, DEFAULT_LOG_PATH,
};

#[test]
fn defaults_match_documented_values() {
    let config = GuardConfig::default();
    assert_eq!(config.pause_secs, 15);
    assert_eq!(config.sleep_secs, 5);
    assert_eq!(config.cooldown_secs, 60);
    assert!(config.enable_iptables);
    assert!(config.enable_logwatch);
    assert_eq!(config.log_path, PathBuf::from(DEFAULT_LOG_PATH));
    let matcher = config.log_regex.as_ref().expect("default pattern compiles");
    assert!(matcher.matches("Torrent"));
}

#[test]
fn parse_full_file() {
    let config = parse_config(
        "# torrent guard\n\
         PAUSE_SEC=10\n\
         SLEEP_SEC = 2\n\
         COOLDOWN_SEC=30\n\
         ENABLE_IPTABLES=0\n\
         ENABLE_LOGWATCH=TRUE\n\
         LOG_PATH=/var/log/xray/access.log\n\
         LOG_REGEX=bittorrent|magnet:\n",
    );
    assert_eq!(config.pause_secs, 10);
    assert_eq!(config.sleep_secs, 2);
    assert_eq!(config.cooldown_secs, 30);
    assert!(!config.enable_iptables);
    assert!(config.enable_logwatch);
    assert_eq!(config.log_path, PathBuf::from("/var/log/xray/access.log"));
    assert_eq!(config.log_regex_raw, "bittorrent|magnet:");
    let matcher = config.log_regex.expect("pattern compiles");
    assert!(matcher.matches("MAGNET:?xt=urn"));
    assert!(!matcher.matches("torrent"));
}

#[test]
fn malformed_and_unknown_lines_are_ignored() {
    let config = parse_config(
        "garbage without equals\n\
         UNKNOWN_KEY=5\n\
         PAUSE_SEC=abc\n\
         =value\n\
         COOLDOWN_SEC=-4\n",
    );
    assert_eq!(config.pause_secs, 15);
    assert_eq!(config.cooldown_secs, -4);
    assert_eq!(config.cooldown_duration(), Duration::ZERO);
}

#[test]
fn value_may_contain_equals_sign() {
    let config = parse_config("LOG_REGEX=peer_id=|info_hash=\n");
    assert_eq!(config.log_regex_raw, "peer_id=|info_hash=");
    assert!(config.log_regex.is_some());
}

#[test]
fn invalid_pattern_leaves_matcher_absent() {
    let config = parse_config("LOG_REGEX=(torrent\n");
    assert_eq!(config.log_regex_raw, "(torrent");
    assert!(config.log_regex.is_none());
}

#[test]
fn empty_pattern_leaves_matcher_absent() {
    let config = parse_config("LOG_REGEX=\n");
    assert!(config.log_regex.is_none());
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = load_config(&dir.path().join("absent.conf"));
    assert_eq!(config.pause_secs, 15);
    assert!(config.log_regex.is_some());
}

#[test]
fn unreadable_path_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    // A directory cannot be read as a file.
    let config = load_config(dir.path());
    assert_eq!(config.sleep_secs, 5);
}

#[test]
fn file_source_rereads_on_every_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("guard.conf");
    std::fs::write(&path, "PAUSE_SEC=3\n").expect("write config");

    let source = FileConfigSource::new(&path);
    assert_eq!(source.load().pause_secs, 3);

    std::fs::write(&path, "PAUSE_SEC=8\n").expect("rewrite config");
    assert_eq!(source.load().pause_secs, 8);
}

#[test]
fn set_key_rewrites_and_appends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("guard.conf");
    std::fs::write(&path, "# guard\nPAUSE_SEC=15\nLOG_PATH=/a.log\n").expect("write config");

    let written = set_key(&path, "PAUSE_SEC", " 20 ").expect("set pause");
    assert_eq!(written, "PAUSE_SEC=20");
    set_key(&path, "ENABLE_LOGWATCH", "0").expect("set logwatch");

    let contents = std::fs::read_to_string(&path).expect("read config");
    assert_eq!(
        contents,
        "# guard\nPAUSE_SEC=20\nLOG_PATH=/a.log\nENABLE_LOGWATCH=0\n"
    );

    let config = load_config(&path);
    assert_eq!(config.pause_secs, 20);
    assert!(!config.enable_logwatch);
}

#[test]
fn set_key_creates_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("new.conf");
    set_key(&path, "LOG_REGEX", "announce").expect("set regex");
    assert_eq!(
        std::fs::read_to_string(&path).expect("read config"),
        "LOG_REGEX=announce\n"
    );
}

#[test]
fn set_key_rejects_unknown_keys_and_multiline_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("guard.conf");

    let err = set_key(&path, "NOPE", "1").expect_err("unknown key");
    assert!(matches!(err, ConfigError::UnknownKey(ref k) if k == "NOPE"));

    let err = set_key(&path, "LOG_PATH", "/a\n/b").expect_err("multi-line value");
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            key: ConfigKey::LogPath,
            ..
        }
    ));
    assert!(!path.exists(), "rejected writes must not create the file");
}

#[test]
fn render_round_trips_through_parser() {
    let first = parse_config("PAUSE_SEC=9\nENABLE_IPTABLES=false\nLOG_REGEX=magnet\n");
    let reparsed = parse_config(&first.render());
    assert_eq!(reparsed.pause_secs, 9);
    assert!(!reparsed.enable_iptables);
    assert_eq!(reparsed.log_regex_raw, "magnet");
}

#[test]
fn tail_changes_only_for_watch_relevant_keys() {
    let base = GuardConfig::default();
    let durations = GuardConfig {
        pause_secs: 1,
        cooldown_secs: 1,
        sleep_secs: 1,
        ..GuardConfig::default()
    };
    assert!(!base.tail_changed(&durations));

    let moved = GuardConfig {
        log_path: PathBuf::from("/elsewhere.log"),
        ..GuardConfig::default()
    };
    assert!(base.tail_changed(&moved));

    let disabled = GuardConfig {
        enable_logwatch: false,
        ..GuardConfig::default()
    };
    assert!(base.tail_changed(&disabled));
}
