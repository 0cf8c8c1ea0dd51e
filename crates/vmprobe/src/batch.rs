//! Send/expect scripts executed against a console session.

use crate::console::{ConsoleSession, Match};
use crate::pattern::Pattern;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use vmprobe_core::{Error, Result};

/// One step of a [`BatchScript`].
#[derive(Debug, Clone)]
pub enum BatchStep {
    /// Write bytes to the guest and continue immediately.
    Send(Vec<u8>),
    /// Wait for `pattern`. `timeout` caps this step; the script's overall
    /// deadline always applies on top of it.
    Expect {
        pattern: Pattern,
        timeout: Option<Duration>,
    },
}

impl fmt::Display for BatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStep::Send(bytes) => write!(f, "send {:?}", String::from_utf8_lossy(bytes)),
            BatchStep::Expect {
                pattern,
                timeout: None,
            } => write!(f, "expect {pattern}"),
            BatchStep::Expect {
                pattern,
                timeout: Some(limit),
            } => write!(f, "expect {pattern} within {limit:?}"),
        }
    }
}

/// Ordered send/expect steps run as one unit.
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use vmprobe::{BatchScript, ConsoleSession};
/// # async fn example(console: &mut ConsoleSession) -> vmprobe::Result<()> {
/// BatchScript::new()
///     .expect("login")
///     .send("root\n")
///     .expect("#")
///     .run(console, Duration::from_secs(150))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatchScript {
    steps: Vec<BatchStep>,
}

/// What a successful script observed.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Step index and match for every `Expect` step, in order.
    pub matches: Vec<(usize, Match)>,
    pub elapsed: Duration,
}

impl BatchScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push(BatchStep::Send(bytes.into()));
        self
    }

    pub fn expect(mut self, pattern: impl Into<Pattern>) -> Self {
        self.steps.push(BatchStep::Expect {
            pattern: pattern.into(),
            timeout: None,
        });
        self
    }

    pub fn expect_within(mut self, pattern: impl Into<Pattern>, limit: Duration) -> Self {
        self.steps.push(BatchStep::Expect {
            pattern: pattern.into(),
            timeout: Some(limit),
        });
        self
    }

    pub fn push(&mut self, step: BatchStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[BatchStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order against `session` within `overall`.
    ///
    /// Stops at the first failing step and reports it as
    /// [`Error::StepFailed`]. Bytes already sent are not undone, so the
    /// console is left in whatever state the partial run produced.
    pub async fn run(&self, session: &mut ConsoleSession, overall: Duration) -> Result<BatchReport> {
        let started = Instant::now();
        let deadline = started + overall;
        let mut matches = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            debug!(session = %session.label(), index, %step, "batch step");
            let outcome = match step {
                BatchStep::Send(bytes) => session.send(bytes).await,
                BatchStep::Expect { pattern, timeout } => {
                    let step_deadline = match timeout {
                        Some(limit) => deadline.min(Instant::now() + *limit),
                        None => deadline,
                    };
                    session
                        .read_until_match(pattern, step_deadline)
                        .await
                        .map(|found| matches.push((index, found)))
                }
            };

            if let Err(source) = outcome {
                debug!(session = %session.label(), index, %step, error = %source, "batch failed");
                return Err(Error::StepFailed {
                    index,
                    step: step.to_string(),
                    source: Box::new(source),
                });
            }
        }

        Ok(BatchReport {
            matches,
            elapsed: started.elapsed(),
        })
    }
}

impl From<Vec<BatchStep>> for BatchScript {
    fn from(steps: Vec<BatchStep>) -> Self {
        Self { steps }
    }
}

impl FromIterator<BatchStep> for BatchScript {
    fn from_iter<I: IntoIterator<Item = BatchStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for BatchScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            writeln!(f, "{index:>3}: {step}")?;
        }
        Ok(())
    }
}
