//! tglogwatch follows the proxy access log and pauses the core when a
//! torrent signature appears.
//!
//! The loop in [`watch`] is the only stateful part; [`cooldown`] and [`tail`]
//! are the pieces it owns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Debounce between consecutive pauses.
pub mod cooldown;
/// Following a live, rotating log file.
pub mod tail;
/// Reconcile, tail, match and pause state machine.
pub mod watch;
