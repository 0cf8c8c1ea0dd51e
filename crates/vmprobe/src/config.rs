//! File-based configuration.
//!
//! Every timeout tied to real VM boot time lives here rather than in code.
//! All sections and keys are optional:
//!
//! ```toml
//! [session]
//! connect_timeout_secs = 10
//! idle_timeout_secs = 30
//!
//! [readiness]
//! timeout_secs = 90
//! poll_interval_ms = 1000
//! max_poll_errors = 3
//!
//! [scenario]
//! cleanup = true
//!
//! [catalog]
//! alpine_image = "kubevirt/alpine-registry-disk-demo:devel"
//! boot_deadline_secs = 150
//! cpu_deadline_secs = 250
//! ```

use crate::catalog::CatalogConfig;
use crate::console::SessionConfig;
use crate::readiness::ReadinessConfig;
use crate::scenario::ScenarioConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vmprobe_core::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub session: SessionSection,
    pub readiness: ReadinessSection,
    pub scenario: ScenarioSection,
    pub catalog: CatalogSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub buffer_limit: usize,
    pub transcript_limit: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        let d = SessionConfig::default();
        Self {
            connect_timeout_secs: d.connect_timeout.as_secs(),
            idle_timeout_secs: d.idle_timeout.as_secs(),
            buffer_limit: d.buffer_limit,
            transcript_limit: d.transcript_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSection {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_poll_errors: u32,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        let scenario = ScenarioConfig::default();
        Self {
            timeout_secs: scenario.ready_timeout.as_secs(),
            poll_interval_ms: scenario.readiness.poll_interval.as_millis() as u64,
            max_poll_errors: scenario.readiness.max_poll_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioSection {
    pub cleanup: bool,
}

impl Default for ScenarioSection {
    fn default() -> Self {
        Self { cleanup: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSection {
    pub alpine_image: String,
    pub cirros_image: String,
    pub device: String,
    pub boot_deadline_secs: u64,
    pub cpu_deadline_secs: u64,
    pub direct_lun: u32,
}

impl Default for CatalogSection {
    fn default() -> Self {
        let d = CatalogConfig::default();
        Self {
            alpine_image: d.alpine_image,
            cirros_image: d.cirros_image,
            device: d.device,
            boot_deadline_secs: d.boot_deadline.as_secs(),
            cpu_deadline_secs: d.cpu_deadline.as_secs(),
            direct_lun: d.direct_lun,
        }
    }
}

impl ProbeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| match e {
            Error::InvalidConfig(msg) => Error::InvalidConfig(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.session.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "session.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.readiness.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "readiness.poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.session.buffer_limit == 0 {
            return Err(Error::InvalidConfig(
                "session.buffer_limit must be at least 1".into(),
            ));
        }
        if self.catalog.device.is_empty() {
            return Err(Error::InvalidConfig("catalog.device must not be empty".into()));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
            buffer_limit: self.session.buffer_limit,
            transcript_limit: self.session.transcript_limit,
        }
    }

    pub fn scenario_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            session: self.session_config(),
            readiness: ReadinessConfig {
                poll_interval: Duration::from_millis(self.readiness.poll_interval_ms),
                max_poll_errors: self.readiness.max_poll_errors,
            },
            ready_timeout: Duration::from_secs(self.readiness.timeout_secs),
            cleanup: self.scenario.cleanup,
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            alpine_image: self.catalog.alpine_image.clone(),
            cirros_image: self.catalog.cirros_image.clone(),
            device: self.catalog.device.clone(),
            boot_deadline: Duration::from_secs(self.catalog.boot_deadline_secs),
            cpu_deadline: Duration::from_secs(self.catalog.cpu_deadline_secs),
            direct_lun: self.catalog.direct_lun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ProbeConfig::from_toml("").unwrap();
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.session_config().connect_timeout, Duration::from_secs(10));
        assert_eq!(config.catalog_config().cpu_deadline, Duration::from_secs(250));
        assert!(config.scenario_config().cleanup);
    }

    #[test]
    fn overrides_apply_per_section() {
        let config = ProbeConfig::from_toml(
            r#"
            [readiness]
            timeout_secs = 300
            poll_interval_ms = 250

            [catalog]
            boot_deadline_secs = 45
            "#,
        )
        .unwrap();
        let scenario = config.scenario_config();
        assert_eq!(scenario.ready_timeout, Duration::from_secs(300));
        assert_eq!(scenario.readiness.poll_interval, Duration::from_millis(250));
        assert_eq!(scenario.readiness.max_poll_errors, 3);
        assert_eq!(config.catalog_config().boot_deadline, Duration::from_secs(45));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ProbeConfig::from_toml("[session]\nconect_timeout_secs = 3\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = ProbeConfig::from_toml("[readiness]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn load_reads_file_and_names_it_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scenario]\ncleanup = false").unwrap();
        let config = ProbeConfig::load(file.path()).unwrap();
        assert!(!config.scenario.cleanup);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[scenario]\ncleanup = 3").unwrap();
        let err = ProbeConfig::load(bad.path()).unwrap_err();
        assert!(err.to_string().contains(&bad.path().display().to_string()));
    }
}
