use std::fmt;

/// Why an expectation ran out of time.
///
/// The kind describes the wait that timed out, not the session as a whole:
/// output left unconsumed by earlier matches does not count as arriving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The console produced no output during this wait.
    NothingArrived,
    /// Output arrived, but none of it matched.
    Unmatched,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::NothingArrived => {
                f.write_str("no console output arrived during the wait")
            }
            TimeoutKind::Unmatched => f.write_str("console output never matched"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to console {target}: {reason}")]
    ConnectFailed { target: String, reason: String },

    #[error("timed out waiting for {pattern} ({kind}); unconsumed output: {tail:?}")]
    ReadTimeout {
        pattern: String,
        kind: TimeoutKind,
        tail: String,
    },

    #[error("console closed by peer")]
    ConsoleClosed,

    #[error("console session already closed")]
    SessionClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("step {index} ({step}) failed: {source}")]
    StepFailed {
        index: usize,
        step: String,
        #[source]
        source: Box<Error>,
    },

    #[error("VM {vm} is not running: {reason}")]
    NotRunning { vm: String, reason: String },

    #[error("polling state of VM {vm} failed: {source}")]
    PollError {
        vm: String,
        #[source]
        source: Box<Error>,
    },

    #[error("VM creation failed: {0}")]
    CreateFailed(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Index of the batch step that failed, if this error came from one.
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            Error::StepFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// The innermost error, looking through step and poll wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } | Error::PollError { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::ReadTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
