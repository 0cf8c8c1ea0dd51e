//! Built-in acceptance scenarios for CPU topology and disk bus naming.

use crate::batch::BatchScript;
use crate::scenario::Scenario;
use std::time::Duration;
use vmprobe_core::{DiskBus, DiskDevice, VmSpec};

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub alpine_image: String,
    pub cirros_image: String,
    pub device: String,
    /// Script budget for scenarios that only boot and list devices.
    pub boot_deadline: Duration,
    /// Script budget for the CPU topology scenario, which boots slower.
    pub cpu_deadline: Duration,
    /// iSCSI LUN used for direct-LUN disk scenarios.
    pub direct_lun: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            alpine_image: "kubevirt/alpine-registry-disk-demo:devel".to_string(),
            cirros_image: "kubevirt/cirros-registry-disk-demo:devel".to_string(),
            device: crate::scenario::DEFAULT_DEVICE.to_string(),
            boot_deadline: Duration::from_secs(150),
            cpu_deadline: Duration::from_secs(250),
            direct_lun: 2,
        }
    }
}

/// Factory for the built-in scenarios.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    /// Alpine login as root, as every Alpine scenario starts.
    fn alpine_login() -> BatchScript {
        BatchScript::new()
            .expect("Welcome to Alpine")
            .send("\n")
            .expect("login")
            .send("root\n")
            .expect("#")
    }

    fn scenario(&self, name: &str, spec: VmSpec, script: BatchScript, deadline: Duration) -> Scenario {
        Scenario::new(name, spec, script)
            .device(&self.config.device)
            .deadline(deadline)
    }

    /// Guest must report `cores` processors.
    pub fn cpu_topology(&self, cores: u32) -> Scenario {
        let spec = VmSpec::random()
            .with_registry_disk("disk0", DiskBus::Virtio, &self.config.alpine_image)
            .cpu_cores(cores);
        let script = Self::alpine_login()
            .send("grep -c ^processor /proc/cpuinfo\n")
            .expect(cores.to_string());
        self.scenario(
            &format!("cpu-topology-{cores}-cores"),
            spec,
            script,
            self.config.cpu_deadline,
        )
    }

    /// A direct LUN on `bus` must show up as the first node for that bus.
    pub fn drive_on_bus(&self, bus: DiskBus) -> Scenario {
        let node = format!("{}a", bus.linux_device_prefix());
        let spec = VmSpec::random().with_direct_lun(
            "disk0",
            DiskDevice::Disk { bus },
            self.config.direct_lun,
            false,
        );
        let script = Self::alpine_login()
            .send(format!("ls {node}\n"))
            .expect(node.as_str());
        self.scenario(
            &format!("{bus}-drive"),
            spec,
            script,
            self.config.boot_deadline,
        )
    }

    pub fn virtio_drive(&self) -> Scenario {
        self.drive_on_bus(DiskBus::Virtio)
    }

    pub fn sata_drive(&self) -> Scenario {
        self.drive_on_bus(DiskBus::Sata)
    }

    /// One disk per bus. The cirros guest does not expose the IDE and floppy
    /// nodes, so only the virtio and sata nodes are asserted.
    pub fn all_drives(&self) -> Scenario {
        let image = &self.config.cirros_image;
        let spec = VmSpec::random()
            .with_registry_disk("disk0", DiskBus::Virtio, image)
            .with_user_data("disk1", "echo hi!\n")
            .with_registry_disk("disk2", DiskBus::Sata, image)
            .with_registry_disk("disk3", DiskBus::Ide, image)
            .with_registry_floppy("disk4", image)
            // q35 has no IDE controller
            .machine_type("pc");
        let script = BatchScript::new()
            .expect("login as 'cirros' user. default password: 'gocubsgo'. use 'sudo' for root.")
            .send("\n")
            .expect("cirros login:")
            .send("cirros\n")
            .expect("Password:")
            .send("gocubsgo\n")
            .expect("$")
            // ls sorts its output, keep the expected order
            .send("ls /dev/sda  /dev/vda  /dev/vdb\n")
            .expect("/dev/sda  /dev/vda  /dev/vdb");
        self.scenario("all-drives", spec, script, self.config.boot_deadline)
    }

    pub fn all(&self) -> Vec<Scenario> {
        vec![
            self.cpu_topology(3),
            self.virtio_drive(),
            self.sata_drive(),
            self.all_drives(),
        ]
    }
}
