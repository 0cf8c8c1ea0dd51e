//! Console-driven acceptance testing for virtual machines.
//!
//! vmprobe provisions VMs through an external orchestration [`Platform`],
//! waits until they run, and verifies what the guest reports by driving its
//! serial console with send/expect scripts.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vmprobe::{BatchScript, DiskBus, Platform, VmSpec, run_scenario};
//!
//! # async fn example(platform: Arc<dyn Platform>) {
//! let spec = VmSpec::random()
//!     .with_registry_disk("disk0", DiskBus::Virtio, "kubevirt/alpine-registry-disk-demo:devel")
//!     .cpu_cores(3);
//!
//! let script = BatchScript::new()
//!     .expect("login")
//!     .send("root\n")
//!     .expect("#")
//!     .send("grep -c ^processor /proc/cpuinfo\n")
//!     .expect("3");
//!
//! let report = run_scenario(platform, spec, script, Duration::from_secs(250)).await;
//! assert!(report.passed(), "{report}");
//! # }
//! ```
//!
//! # Guides
//!
//! - **[Writing Scenarios](guides::writing_scenarios)** - scripts, deadlines and failure reports

mod batch;
mod catalog;
mod config;
mod connect;
mod console;
pub mod guides;
mod pattern;
mod readiness;
mod scenario;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Console engine
pub use batch::{BatchReport, BatchScript, BatchStep};
pub use connect::ConnectionTarget;
pub use console::{ConsoleSession, Match, SessionConfig};
pub use pattern::Pattern;

// Scenarios
pub use catalog::{Catalog, CatalogConfig};
pub use readiness::{ReadinessConfig, wait_running};
pub use scenario::{
    DEFAULT_DEVICE, Scenario, ScenarioConfig, ScenarioOutcome, ScenarioReport, ScenarioRunner,
    ScenarioStage, run_scenario,
};

// Configuration
pub use config::{CatalogSection, ProbeConfig, ReadinessSection, ScenarioSection, SessionSection};

// Platform contract and shared types
pub use vmprobe_core::{
    ConsoleIo, ConsoleStream, DEFAULT_NAMESPACE, Disk, DiskBus, DiskDevice, DiskSource, Platform,
    TimeoutKind, VmHandle, VmPhase, VmSpec,
};

// Errors
pub use vmprobe_core::{Error, Result};

pub use tokio_util::sync::CancellationToken;
