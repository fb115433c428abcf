//! Bounded capture of a child process's combined output.
//!
//! Mirrors a capped exec: stdout and stderr are drained together and once
//! their combined size crosses the bound the child is killed and the run is
//! reported as an overflow instead of a normal exit.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const CHUNK_SIZE: usize = 8192;

/// Bytes kept from the end of the output for error reports.
pub const TAIL_BYTES: usize = 2048;

/// Accumulates output up to a fixed bound.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    limit: usize,
    total: u64,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            total: 0,
        }
    }

    /// Append a chunk. Returns false once the total seen exceeds the limit;
    /// bytes past the limit are counted but not stored.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.total += chunk.len() as u64;
        let room = self.limit.saturating_sub(self.data.len());
        let keep = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..keep]);
        !self.overflowed()
    }

    pub fn overflowed(&self) -> bool {
        self.total > self.limit as u64
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Last [`TAIL_BYTES`] of stored output, lossily decoded.
    pub fn tail(&self) -> String {
        let start = self.data.len().saturating_sub(TAIL_BYTES);
        String::from_utf8_lossy(&self.data[start..]).trim().to_string()
    }
}

/// Result of one bounded run.
#[derive(Debug)]
pub struct Captured {
    /// Exit status; `None` when the child was killed for overflowing.
    pub status: Option<ExitStatus>,
    pub overflowed: bool,
    pub total_bytes: u64,
    pub tail: String,
    pub elapsed: Duration,
}

/// Spawn `cmd` and drain its combined output into a buffer capped at `limit`.
///
/// Dropping the returned future kills the child.
pub async fn capture_bounded(mut cmd: Command, limit: usize) -> io::Result<Captured> {
    let started = Instant::now();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    debug!(pid = ?child.id(), limit, "Spawned child with bounded capture");

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone(), "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx.clone(), "stderr"));
    }
    drop(tx);

    let mut buffer = CaptureBuffer::new(limit);
    while let Some(chunk) = rx.recv().await {
        if !buffer.push(&chunk) {
            warn!(
                captured = buffer.total(),
                limit, "Output capture bound exceeded, killing child"
            );
            child.start_kill()?;
            let _ = child.wait().await;
            return Ok(Captured {
                status: None,
                overflowed: true,
                total_bytes: buffer.total(),
                tail: buffer.tail(),
                elapsed: started.elapsed(),
            });
        }
    }

    let status = child.wait().await?;
    debug!(?status, captured = buffer.total(), "Child exited");
    Ok(Captured {
        status: Some(status),
        overflowed: false,
        total_bytes: buffer.total(),
        tail: buffer.tail(),
        elapsed: started.elapsed(),
    })
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                trace!(stream, bytes = n, "Captured chunk");
                if tx.send(chunk[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(stream, error = %e, "Read from child failed");
                break;
            }
        }
    }
}
