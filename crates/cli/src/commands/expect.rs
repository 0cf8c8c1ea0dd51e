//! The `expect` command - runs a batch script against a live console.

use crate::script;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use vmprobe::{CancellationToken, ConnectionTarget, ConsoleSession, ProbeConfig};

const DEFAULT_DEADLINE_SECS: u64 = 150;

#[derive(Args)]
pub struct ExpectArgs {
    /// Console to attach to (tcp:HOST:PORT or unix:PATH)
    #[arg(long)]
    target: ConnectionTarget,

    /// Path to the TOML batch script
    #[arg(long)]
    script: PathBuf,

    /// Overall deadline in seconds (overrides the script's deadline_secs)
    #[arg(long, value_parser = parse_secs)]
    deadline: Option<u64>,

    /// Connection timeout in seconds
    #[arg(long, value_parser = parse_secs)]
    connect_timeout: Option<u64>,

    /// Path to a configuration file with session settings
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the console transcript when the script fails
    #[arg(long)]
    transcript: bool,
}

pub async fn run(args: ExpectArgs) -> anyhow::Result<()> {
    let loaded = script::load(&args.script)?;
    let config = match &args.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    let mut session_config = config.session_config();
    if let Some(secs) = args.connect_timeout {
        session_config.connect_timeout = Duration::from_secs(secs);
    }
    let deadline = args
        .deadline
        .map(Duration::from_secs)
        .or(loaded.deadline)
        .unwrap_or(Duration::from_secs(DEFAULT_DEADLINE_SECS));

    let abort = CancellationToken::new();
    let on_interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let stream = args.target.connect(session_config.connect_timeout).await?;
    let mut session = ConsoleSession::with_cancellation(stream, session_config, &abort)
        .labelled(args.target.to_string());
    info!(console = %args.target, steps = loaded.script.len(), ?deadline, "running script");

    let result = loaded.script.run(&mut session, deadline).await;
    session.close().await?;

    match result {
        Ok(report) => {
            for (index, found) in &report.matches {
                println!("step {index}: matched {:?} at offset {}", found.matched, found.start);
            }
            eprintln!(
                "{} steps passed in {:.1}s",
                loaded.script.len(),
                report.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(err) => {
            if args.transcript {
                eprintln!("--- console transcript ---");
                eprintln!("{}", session.transcript());
                eprintln!("--- end of transcript ---");
            }
            Err(err.into())
        }
    }
}

fn parse_secs(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if secs == 0 {
        return Err("must be at least 1 second".to_string());
    }
    Ok(secs)
}
