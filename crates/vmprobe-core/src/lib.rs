pub mod error;
pub mod platform;
pub mod types;

pub use error::{Error, Result, TimeoutKind};
pub use platform::{ConsoleIo, ConsoleStream, Platform};
pub use types::{
    DEFAULT_NAMESPACE, Disk, DiskBus, DiskDevice, DiskSource, VmHandle, VmPhase, VmSpec,
};
