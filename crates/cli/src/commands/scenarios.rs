//! The `scenarios` command - lists the built-in acceptance scenarios.

use clap::Args;
use std::path::PathBuf;
use vmprobe::{Catalog, Disk, DiskDevice, DiskSource, ProbeConfig, Scenario};

#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
}

pub fn run(args: ScenariosArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    let catalog = Catalog::new(config.catalog_config());

    for scenario in catalog.all() {
        print!("{}", describe(&scenario));
        println!();
    }
    Ok(())
}

fn describe(scenario: &Scenario) -> String {
    let spec = &scenario.spec;
    let mut out = format!(
        "{} (deadline {}s, device {})\n",
        scenario.name,
        scenario.deadline.as_secs(),
        scenario.device
    );
    out.push_str(&format!(
        "  vm: {} MB, cpus={}, machine={}\n",
        spec.memory_mb,
        spec.cpu_cores
            .map_or("default".to_string(), |n| n.to_string()),
        spec.machine_type.as_deref().unwrap_or("default")
    ));
    for disk in &spec.disks {
        out.push_str(&format!("  disk {}\n", describe_disk(disk)));
    }
    out.push_str("  script:\n");
    for (index, step) in scenario.script.steps().iter().enumerate() {
        out.push_str(&format!("    {index}: {step}\n"));
    }
    out
}

fn describe_disk(disk: &Disk) -> String {
    let device = match &disk.device {
        DiskDevice::Disk { bus } => format!("{bus} disk"),
        DiskDevice::Floppy => "floppy".to_string(),
    };
    let source = match &disk.source {
        DiskSource::RegistryDisk { image } => format!("registry {image}"),
        DiskSource::DirectLun { lun, read_only } => {
            format!("lun {lun}{}", if *read_only { " (ro)" } else { "" })
        }
        DiskSource::CloudInitNoCloud { .. } => "cloud-init".to_string(),
    };
    format!("{}: {device} from {source}", disk.name)
}
