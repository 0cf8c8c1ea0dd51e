use serde::{Deserialize, Serialize};
use std::fmt;

/// Bus a disk is attached to. Decides the guest device node prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    #[default]
    Virtio,
    Sata,
    Ide,
    Scsi,
}

impl DiskBus {
    /// Device node prefix a Linux guest uses for the first disk on this bus.
    pub fn linux_device_prefix(self) -> &'static str {
        match self {
            DiskBus::Virtio => "/dev/vd",
            DiskBus::Sata | DiskBus::Scsi => "/dev/sd",
            DiskBus::Ide => "/dev/hd",
        }
    }
}

impl fmt::Display for DiskBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiskBus::Virtio => "virtio",
            DiskBus::Sata => "sata",
            DiskBus::Ide => "ide",
            DiskBus::Scsi => "scsi",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum DiskDevice {
    Disk { bus: DiskBus },
    Floppy,
}

/// Where the disk's contents come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DiskSource {
    /// Ephemeral disk pulled from a container registry image.
    RegistryDisk { image: String },
    /// iSCSI LUN exposed by the platform's test storage target.
    DirectLun { lun: u32, read_only: bool },
    /// cloud-init NoCloud data source carrying user data.
    CloudInitNoCloud { user_data: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub name: String,
    pub device: DiskDevice,
    pub source: DiskSource,
}

impl Disk {
    pub fn new(name: impl Into<String>, device: DiskDevice, source: DiskSource) -> Self {
        Self {
            name: name.into(),
            device,
            source,
        }
    }

    pub fn bus(&self) -> Option<DiskBus> {
        match self.device {
            DiskDevice::Disk { bus } => Some(bus),
            DiskDevice::Floppy => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_device_prefixes() {
        assert_eq!(DiskBus::Virtio.linux_device_prefix(), "/dev/vd");
        assert_eq!(DiskBus::Sata.linux_device_prefix(), "/dev/sd");
        assert_eq!(DiskBus::Ide.linux_device_prefix(), "/dev/hd");
    }

    #[test]
    fn floppy_has_no_bus() {
        let disk = Disk::new(
            "disk4",
            DiskDevice::Floppy,
            DiskSource::RegistryDisk {
                image: "cirros".into(),
            },
        );
        assert_eq!(disk.bus(), None);
    }

    #[test]
    fn device_serializes_tagged() {
        let json = serde_json::to_string(&DiskDevice::Disk {
            bus: DiskBus::Sata,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"disk","bus":"sata"}"#);
    }
}
