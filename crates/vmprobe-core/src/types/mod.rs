mod disk;
mod spec;
mod vm;

pub use disk::{Disk, DiskBus, DiskDevice, DiskSource};
pub use spec::{DEFAULT_NAMESPACE, VmSpec};
pub use vm::{VmHandle, VmPhase};
