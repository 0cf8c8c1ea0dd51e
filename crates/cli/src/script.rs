//! Batch scripts stored as TOML.
//!
//! ```toml
//! deadline_secs = 150
//!
//! [[step]]
//! expect = "login"
//!
//! [[step]]
//! send = "root\n"
//!
//! [[step]]
//! expect_regex = "[#$] $"
//! timeout_secs = 10
//! ```

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use vmprobe::{BatchScript, BatchStep, Pattern};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    deadline_secs: Option<u64>,
    #[serde(default, rename = "step")]
    steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepEntry {
    send: Option<String>,
    expect: Option<String>,
    expect_regex: Option<String>,
    timeout_secs: Option<u64>,
}

/// A parsed script file.
#[derive(Debug)]
pub struct LoadedScript {
    pub script: BatchScript,
    /// Overall deadline requested by the file, if any.
    pub deadline: Option<Duration>,
}

pub fn load(path: &Path) -> anyhow::Result<LoadedScript> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid script {}", path.display()))
}

pub fn parse(text: &str) -> anyhow::Result<LoadedScript> {
    let file: ScriptFile = toml::from_str(text)?;

    let mut script = BatchScript::new();
    for (index, entry) in file.steps.into_iter().enumerate() {
        script.push(entry.into_step().with_context(|| format!("step {index}"))?);
    }

    Ok(LoadedScript {
        script,
        deadline: file.deadline_secs.map(Duration::from_secs),
    })
}

impl StepEntry {
    fn into_step(self) -> anyhow::Result<BatchStep> {
        let timeout = self.timeout_secs.map(Duration::from_secs);
        match (self.send, self.expect, self.expect_regex) {
            (Some(bytes), None, None) => {
                if timeout.is_some() {
                    bail!("timeout_secs only applies to expect steps");
                }
                Ok(BatchStep::Send(bytes.into_bytes()))
            }
            (None, Some(text), None) => Ok(BatchStep::Expect {
                pattern: Pattern::literal(text),
                timeout,
            }),
            (None, None, Some(expr)) => Ok(BatchStep::Expect {
                pattern: Pattern::regex(&expr)?,
                timeout,
            }),
            (None, None, None) => bail!("needs one of send, expect or expect_regex"),
            _ => bail!("send, expect and expect_regex are mutually exclusive"),
        }
    }
}
