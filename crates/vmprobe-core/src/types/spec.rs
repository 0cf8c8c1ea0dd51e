use super::disk::{Disk, DiskBus, DiskDevice, DiskSource};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "kubevirt-test-default";

const DEFAULT_MEMORY_MB: u32 = 64;

/// Declarative description of a VM to create on the platform.
///
/// ```rust
/// use vmprobe_core::{DiskBus, VmSpec};
///
/// let spec = VmSpec::random()
///     .with_registry_disk("disk0", DiskBus::Virtio, "kubevirt/alpine-registry-disk-demo:devel")
///     .cpu_cores(3);
/// assert_eq!(spec.cpu_cores, Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    pub name: String,
    pub namespace: String,
    pub memory_mb: u32,
    pub cpu_cores: Option<u32>,
    /// Emulated machine type, e.g. `pc` when IDE support is needed.
    pub machine_type: Option<String>,
    pub disks: Vec<Disk>,
}

impl VmSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            memory_mb: DEFAULT_MEMORY_MB,
            cpu_cores: None,
            machine_type: None,
            disks: Vec::new(),
        }
    }

    /// A spec with a unique `testvm` name.
    pub fn random() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::new(format!("testvm{}", &suffix[..12]))
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn cpu_cores(mut self, cores: u32) -> Self {
        self.cpu_cores = Some(cores);
        self
    }

    pub fn machine_type(mut self, machine: impl Into<String>) -> Self {
        self.machine_type = Some(machine.into());
        self
    }

    pub fn with_disk(mut self, disk: Disk) -> Self {
        self.disks.push(disk);
        self
    }

    pub fn with_registry_disk(
        self,
        name: impl Into<String>,
        bus: DiskBus,
        image: impl Into<String>,
    ) -> Self {
        self.with_disk(Disk::new(
            name,
            DiskDevice::Disk { bus },
            DiskSource::RegistryDisk {
                image: image.into(),
            },
        ))
    }

    pub fn with_registry_floppy(self, name: impl Into<String>, image: impl Into<String>) -> Self {
        self.with_disk(Disk::new(
            name,
            DiskDevice::Floppy,
            DiskSource::RegistryDisk {
                image: image.into(),
            },
        ))
    }

    pub fn with_direct_lun(
        self,
        name: impl Into<String>,
        device: DiskDevice,
        lun: u32,
        read_only: bool,
    ) -> Self {
        self.with_disk(Disk::new(
            name,
            device,
            DiskSource::DirectLun { lun, read_only },
        ))
    }

    pub fn with_user_data(self, name: impl Into<String>, user_data: impl Into<String>) -> Self {
        self.with_disk(Disk::new(
            name,
            DiskDevice::Disk {
                bus: DiskBus::Virtio,
            },
            DiskSource::CloudInitNoCloud {
                user_data: user_data.into(),
            },
        ))
    }

    /// Disks attached to `bus`, in declaration order.
    pub fn disks_on(&self, bus: DiskBus) -> impl Iterator<Item = &Disk> {
        self.disks.iter().filter(move |d| d.bus() == Some(bus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_names_are_unique() {
        let a = VmSpec::random();
        let b = VmSpec::random();
        assert!(a.name.starts_with("testvm"));
        assert_ne!(a.name, b.name);
        assert_eq!(a.namespace, DEFAULT_NAMESPACE);
        assert_eq!(a.memory_mb, 64);
    }

    #[test]
    fn disks_keep_declaration_order() {
        let spec = VmSpec::new("vm")
            .with_registry_disk("disk0", DiskBus::Virtio, "cirros")
            .with_user_data("disk1", "echo hi!\n")
            .with_registry_disk("disk2", DiskBus::Sata, "cirros")
            .with_registry_floppy("disk4", "cirros");

        let names: Vec<_> = spec.disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["disk0", "disk1", "disk2", "disk4"]);
        assert_eq!(spec.disks_on(DiskBus::Virtio).count(), 2);
        assert_eq!(spec.disks_on(DiskBus::Sata).count(), 1);
    }

    #[test]
    fn direct_lun_records_source() {
        let spec = VmSpec::new("vm").with_direct_lun(
            "disk0",
            DiskDevice::Disk {
                bus: DiskBus::Sata,
            },
            2,
            false,
        );
        assert_eq!(
            spec.disks[0].source,
            DiskSource::DirectLun {
                lun: 2,
                read_only: false
            }
        );
    }
}
