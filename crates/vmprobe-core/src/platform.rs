//! The seam between vmprobe and the VM orchestration platform.

use crate::error::Result;
use crate::types::{VmHandle, VmPhase, VmSpec};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream bound to a guest's serial device.
pub trait ConsoleIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ConsoleIo for T {}

pub type ConsoleStream = Box<dyn ConsoleIo>;

/// Operations vmprobe needs from the platform that hosts the VMs.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Submits `spec` for creation.
    async fn create_vm(&self, spec: &VmSpec) -> Result<VmHandle>;

    /// Returns the currently observed phase of `vm`.
    async fn vm_phase(&self, vm: &VmHandle) -> Result<VmPhase>;

    /// Attaches to the named serial `device` of a running VM.
    async fn open_console(
        &self,
        vm: &VmHandle,
        device: &str,
        connect_timeout: Duration,
    ) -> Result<ConsoleStream>;

    async fn delete_vm(&self, _vm: &VmHandle) -> Result<()> {
        Ok(())
    }
}
