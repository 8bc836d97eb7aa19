//! Following a live, possibly rotating access log.
//!
//! [`LogTailSource::open`] yields a [`LineStream`] that starts at the current
//! end of file and ends when the follower dies. It never retries on its own;
//! the watch loop decides when to open again.

use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::Stream;
use tracing::debug;

/// Lines appended to the followed log, in arrival order.
///
/// Dropping the stream closes the underlying follower.
pub type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Errors from starting a follower.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// The follower process could not be spawned.
    #[error("failed to follow {path}: {source}")]
    Spawn {
        /// Log being followed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The follower started without a readable stdout.
    #[error("follower for {0} has no stdout")]
    NoStdout(String),
}

/// Something that can follow a log file by path.
#[async_trait]
pub trait LogTailSource: Send + Sync {
    /// Start following `path` from its current end.
    async fn open(&self, path: &Path) -> Result<LineStream, TailError>;
}

/// Follows logs with `tail -n 0 -F`, which survives rotation and truncation
/// by re-opening the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTail;

#[async_trait]
impl LogTailSource for ProcessTail {
    async fn open(&self, path: &Path) -> Result<LineStream, TailError> {
        let shown = path.display().to_string();

        let mut child = Command::new("tail")
            .arg("-n")
            .arg("0")
            .arg("-F")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TailError::Spawn {
                path: shown.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TailError::NoStdout(shown.clone()))?;

        debug!(path = %shown, pid = ?child.id(), "tail follower started");
        Ok(Box::pin(FollowerLines {
            lines: SplitStream::new(BufReader::new(stdout).split(b'\n')),
            _child: child,
            path: shown,
        }))
    }
}

/// Line stream over a follower's stdout. Owns the child so dropping the
/// stream kills it. Bytes that are not UTF-8 are replaced rather than
/// ending the stream.
struct FollowerLines {
    lines: SplitStream<BufReader<ChildStdout>>,
    _child: Child,
    path: String,
}

impl Stream for FollowerLines {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        match Pin::new(&mut this.lines).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(decode_line(&bytes))),
            Poll::Ready(Some(Err(e))) => {
                debug!(path = %this.path, error = %e, "tail read failed, ending stream");
                Poll::Ready(None)
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
