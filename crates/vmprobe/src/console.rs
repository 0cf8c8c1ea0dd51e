//! Serial console sessions with deadline-bounded pattern matching.
//!
//! A [`ConsoleSession`] owns one duplex console stream. A background task
//! pumps incoming bytes into a channel; [`ConsoleSession::read_until_match`]
//! races that channel against a wall-clock deadline, so a silent guest can
//! never stall a test past its budget.
//!
//! Matching is forward-only: every successful match consumes the stream up
//! to the end of the match, and later searches only look at bytes after it.

use crate::connect::ConnectionTarget;
use crate::pattern::Pattern;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use vmprobe_core::{ConsoleStream, Error, Result, TimeoutKind};

const READ_CHUNK: usize = 4096;
const EVENT_QUEUE: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
const TAIL_BYTES: usize = 256;

/// Tunables for a console session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for establishing the connection.
    pub connect_timeout: Duration,
    /// How long the console may stay silent before it is reported as such.
    ///
    /// Silence alone never fails a read; only the caller's deadline does.
    pub idle_timeout: Duration,
    /// Maximum unconsumed bytes kept for matching. Oldest bytes are dropped
    /// beyond this.
    pub buffer_limit: usize,
    /// Maximum bytes of raw output retained for diagnostics.
    pub transcript_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            buffer_limit: 1024 * 1024,
            transcript_limit: 64 * 1024,
        }
    }
}

/// A successful expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Absolute stream offset of the first matched byte.
    pub start: usize,
    /// Absolute stream offset just past the match; the new consumption point.
    pub end: usize,
    pub matched: String,
    /// Output skipped between the previous consumption point and the match.
    pub before: String,
}

enum ReaderEvent {
    Data(Vec<u8>),
    Eof,
    Failed(std::io::Error),
}

enum Wake {
    Cancelled,
    Event(Option<ReaderEvent>),
    Silent,
    Deadline,
}

/// An open console connection to one guest.
pub struct ConsoleSession {
    label: String,
    config: SessionConfig,
    writer: Option<WriteHalf<ConsoleStream>>,
    events: mpsc::Receiver<ReaderEvent>,
    reader: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    /// Unconsumed bytes; `buffer[0]` sits at absolute offset `consumed`.
    buffer: Vec<u8>,
    consumed: usize,
    transcript: Vec<u8>,
    ended: bool,
    closed: bool,
}

impl ConsoleSession {
    /// Connects to `target` and starts reading from it.
    pub async fn open(target: &ConnectionTarget, config: SessionConfig) -> Result<Self> {
        let stream = target.connect(config.connect_timeout).await?;
        debug!(console = %target, "console connected");
        Ok(Self::new(stream, config).labelled(target.to_string()))
    }

    /// Wraps an already established console stream.
    pub fn new(stream: ConsoleStream, config: SessionConfig) -> Self {
        Self::with_cancellation(stream, config, &CancellationToken::new())
    }

    /// Like [`new`](Self::new), but blocked reads also return
    /// [`Error::Cancelled`] once `parent` is cancelled.
    pub fn with_cancellation(
        stream: ConsoleStream,
        config: SessionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let cancel = parent.child_token();
        let reader = tokio::spawn(pump(read_half, tx, cancel.clone()));

        Self {
            label: "console".to_string(),
            config,
            writer: Some(write_half),
            events: rx,
            reader: Some(reader),
            cancel,
            buffer: Vec::new(),
            consumed: 0,
            transcript: Vec::new(),
            ended: false,
            closed: false,
        }
    }

    /// Sets the name used for this session in log output.
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Token that aborts blocked reads on this session when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Writes `bytes` verbatim to the guest.
    pub async fn send(&mut self, bytes: impl AsRef<[u8]>) -> Result<()> {
        let bytes = bytes.as_ref();
        let writer = self.writer.as_mut().ok_or(Error::SessionClosed)?;
        trace!(session = %self.label, data = ?String::from_utf8_lossy(bytes), "send");
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Waits until `pattern` appears in the unconsumed output or `deadline`
    /// passes.
    ///
    /// Bytes already buffered are checked before waiting, so a pattern that
    /// arrived early still matches even with an expired deadline. Output
    /// arriving after `deadline` is never waited for, however steady.
    ///
    /// On timeout, [`TimeoutKind`] describes this wait only: `NothingArrived`
    /// means no byte came in since the call started, even if the reported
    /// tail still holds older unconsumed output.
    pub async fn read_until_match(&mut self, pattern: &Pattern, deadline: Instant) -> Result<Match> {
        if self.closed {
            return Err(Error::SessionClosed);
        }

        let mut received = 0usize;
        let mut silent_since = Instant::now();
        let mut reported_silent = false;

        loop {
            if let Some(found) = self.take_match(pattern) {
                debug!(
                    session = %self.label,
                    %pattern,
                    start = found.start,
                    end = found.end,
                    "matched"
                );
                return Ok(found);
            }
            if self.ended {
                return Err(Error::ConsoleClosed);
            }
            // A chatty guest keeps the channel ready; the deadline still wins.
            if Instant::now() >= deadline {
                return Err(self.timeout_error(pattern, received));
            }

            let idle_at = silent_since + self.config.idle_timeout;
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = sleep_until(deadline) => Wake::Deadline,
                event = self.events.recv() => Wake::Event(event),
                _ = sleep_until(idle_at), if !reported_silent => Wake::Silent,
            };

            match wake {
                Wake::Cancelled => return Err(Error::Cancelled),
                Wake::Event(Some(ReaderEvent::Data(chunk))) => {
                    received += chunk.len();
                    silent_since = Instant::now();
                    reported_silent = false;
                    self.push(chunk);
                }
                Wake::Event(Some(ReaderEvent::Failed(e))) => {
                    self.ended = true;
                    return Err(Error::Io(e));
                }
                Wake::Event(Some(ReaderEvent::Eof) | None) => {
                    // Leftover bytes get one last look at the top of the loop.
                    self.ended = true;
                }
                Wake::Silent => {
                    reported_silent = true;
                    warn!(
                        session = %self.label,
                        %pattern,
                        idle = ?self.config.idle_timeout,
                        "console silent"
                    );
                }
                Wake::Deadline => return Err(self.timeout_error(pattern, received)),
            }
        }
    }

    /// [`read_until_match`](Self::read_until_match) with a relative timeout.
    pub async fn expect(&mut self, pattern: &Pattern, within: Duration) -> Result<Match> {
        self.read_until_match(pattern, Instant::now() + within).await
    }

    /// Absolute offset of the consumption point.
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Output received but not yet consumed by a match.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buffer
    }

    /// The most recent raw output, lossily decoded.
    pub fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.transcript).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cancel.cancel();

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            match timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
                Ok(Ok(())) => {}
                // The peer may already be gone; the connection is released either way.
                Ok(Err(e)) => debug!(session = %self.label, error = %e, "shutdown failed"),
                Err(_) => debug!(session = %self.label, "shutdown timed out"),
            }
        }
        debug!(session = %self.label, "console closed");
        Ok(())
    }

    fn push(&mut self, chunk: Vec<u8>) {
        trace!(session = %self.label, data = ?String::from_utf8_lossy(&chunk), "recv");

        self.transcript.extend_from_slice(&chunk);
        if self.transcript.len() > self.config.transcript_limit {
            let excess = self.transcript.len() - self.config.transcript_limit;
            self.transcript.drain(..excess);
        }

        self.buffer.extend_from_slice(&chunk);
        if self.buffer.len() > self.config.buffer_limit {
            let excess = self.buffer.len() - self.config.buffer_limit;
            self.buffer.drain(..excess);
            self.consumed += excess;
            warn!(session = %self.label, dropped = excess, "console buffer full");
        }
    }

    fn take_match(&mut self, pattern: &Pattern) -> Option<Match> {
        let range = pattern.find(&self.buffer)?;
        let found = Match {
            start: self.consumed + range.start,
            end: self.consumed + range.end,
            matched: String::from_utf8_lossy(&self.buffer[range.clone()]).into_owned(),
            before: String::from_utf8_lossy(&self.buffer[..range.start]).into_owned(),
        };
        self.buffer.drain(..range.end);
        self.consumed += range.end;
        Some(found)
    }

    fn timeout_error(&self, pattern: &Pattern, received: usize) -> Error {
        let kind = if received == 0 {
            TimeoutKind::NothingArrived
        } else {
            TimeoutKind::Unmatched
        };
        let tail_start = self.buffer.len().saturating_sub(TAIL_BYTES);
        Error::ReadTimeout {
            pattern: pattern.to_string(),
            kind,
            tail: String::from_utf8_lossy(&self.buffer[tail_start..]).into_owned(),
        }
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn pump(
    mut reader: ReadHalf<ConsoleStream>,
    tx: mpsc::Sender<ReaderEvent>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read(&mut buf) => read,
        };
        let (event, last) = match read {
            Ok(0) => (ReaderEvent::Eof, true),
            Ok(n) => (ReaderEvent::Data(buf[..n].to_vec()), false),
            Err(e) => (ReaderEvent::Failed(e), true),
        };
        if tx.send(event).await.is_err() || last {
            return;
        }
    }
}
