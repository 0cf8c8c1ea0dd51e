//! Waiting for a VM to reach the running phase before touching its console.

use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};
use vmprobe_core::{Error, Platform, Result, VmHandle, VmPhase};

#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    pub poll_interval: Duration,
    /// Consecutive failed polls tolerated before giving up.
    pub max_poll_errors: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_poll_errors: 3,
        }
    }
}

/// Polls `vm` until it is running.
///
/// Returns [`Error::NotRunning`] as soon as the VM lands in a terminal phase,
/// or once `timeout` passes while it is still pending. Polls that fail more
/// than `max_poll_errors` times in a row end with [`Error::PollError`].
/// A poll still outstanding at the deadline is abandoned.
pub async fn wait_running(
    platform: &dyn Platform,
    vm: &VmHandle,
    timeout: Duration,
    config: &ReadinessConfig,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut poll_errors = 0u32;
    let mut last_phase = VmPhase::Pending;

    let expired = |last_phase: VmPhase| Error::NotRunning {
        vm: vm.to_string(),
        reason: format!("still {last_phase} after {timeout:?}"),
    };

    loop {
        let Ok(polled) = timeout_at(deadline, platform.vm_phase(vm)).await else {
            warn!(%vm, "VM phase query did not answer before the deadline");
            return Err(expired(last_phase));
        };
        match polled {
            Ok(VmPhase::Running) => {
                debug!(%vm, "VM running");
                return Ok(());
            }
            Ok(phase) if phase.is_terminal() => {
                return Err(Error::NotRunning {
                    vm: vm.to_string(),
                    reason: format!("VM entered terminal phase {phase}"),
                });
            }
            Ok(phase) => {
                if phase != last_phase {
                    debug!(%vm, %phase, "VM not running yet");
                }
                last_phase = phase;
                poll_errors = 0;
            }
            Err(e) => {
                poll_errors += 1;
                if poll_errors > config.max_poll_errors {
                    return Err(Error::PollError {
                        vm: vm.to_string(),
                        source: Box::new(e),
                    });
                }
                warn!(%vm, error = %e, attempt = poll_errors, "polling VM phase failed");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(expired(last_phase));
        }
        sleep(config.poll_interval.min(deadline - now)).await;
    }
}
