use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a VM as reported by the orchestration platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmPhase {
    #[default]
    Pending,
    Scheduling,
    Scheduled,
    Running,
    Succeeded,
    Failed,
}

impl VmPhase {
    /// Whether the VM can never reach `Running` from this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, VmPhase::Succeeded | VmPhase::Failed)
    }

    pub fn is_running(self) -> bool {
        self == VmPhase::Running
    }
}

impl fmt::Display for VmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmPhase::Pending => "pending",
            VmPhase::Scheduling => "scheduling",
            VmPhase::Scheduled => "scheduled",
            VmPhase::Running => "running",
            VmPhase::Succeeded => "succeeded",
            VmPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Reference to a VM created on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmHandle {
    pub namespace: String,
    pub name: String,
}

impl VmHandle {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for VmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(VmPhase::Failed.is_terminal());
        assert!(VmPhase::Succeeded.is_terminal());
        assert!(!VmPhase::Pending.is_terminal());
        assert!(!VmPhase::Scheduled.is_terminal());
        assert!(!VmPhase::Running.is_terminal());
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&VmPhase::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::from_str::<VmPhase>("\"failed\"").unwrap(),
            VmPhase::Failed
        );
    }

    #[test]
    fn handle_displays_namespace_and_name() {
        let vm = VmHandle::new("kubevirt-test-default", "testvmabc");
        assert_eq!(vm.to_string(), "kubevirt-test-default/testvmabc");
    }
}
