//! Torrent Guard: keeps a proxy core from being flagged for torrent traffic.
//!
//! Shared pieces used by the `tglogwatch` daemon and the `tgctl` operator
//! CLI: the configuration snapshot, the log signature matcher, systemd
//! service control, the pause cycle and logging setup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod pattern;
pub mod pause;
pub mod services;
