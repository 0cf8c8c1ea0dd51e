use super::guest::{FakeGuest, GuestHandle};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use vmprobe_core::{ConsoleStream, Error, Platform, Result, VmHandle, VmPhase, VmSpec};

#[derive(Debug, Clone)]
enum PhaseStep {
    Phase(VmPhase),
    Error(String),
    Hang,
}

/// How one fake VM behaves once created.
#[derive(Debug, Clone, Default)]
pub struct VmPlan {
    phases: VecDeque<PhaseStep>,
    guest: Option<FakeGuest>,
    refuse_console: bool,
}

impl VmPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A VM that is running on the first poll and serves `guest`.
    pub fn running(guest: FakeGuest) -> Self {
        Self::new().phase(VmPhase::Running).guest(guest)
    }

    /// Appends a phase to report on the next poll. The last step repeats
    /// forever.
    pub fn phase(mut self, phase: VmPhase) -> Self {
        self.phases.push_back(PhaseStep::Phase(phase));
        self
    }

    pub fn phases(mut self, phases: impl IntoIterator<Item = VmPhase>) -> Self {
        self.phases
            .extend(phases.into_iter().map(PhaseStep::Phase));
        self
    }

    /// Appends a failing poll.
    pub fn poll_error(mut self, message: impl Into<String>) -> Self {
        self.phases.push_back(PhaseStep::Error(message.into()));
        self
    }

    /// Appends a poll that never answers, like a stalled API request.
    pub fn hang_poll(mut self) -> Self {
        self.phases.push_back(PhaseStep::Hang);
        self
    }

    pub fn guest(mut self, guest: FakeGuest) -> Self {
        self.guest = Some(guest);
        self
    }

    /// Makes `open_console` fail with [`Error::ConnectFailed`].
    pub fn refuse_console(mut self) -> Self {
        self.refuse_console = true;
        self
    }
}

#[derive(Default)]
struct FakeVm {
    plan: VmPlan,
    polls: usize,
    guest: Option<GuestHandle>,
}

#[derive(Default)]
struct State {
    plans: VecDeque<VmPlan>,
    created: Vec<VmSpec>,
    deleted: Vec<VmHandle>,
    vms: HashMap<VmHandle, FakeVm>,
    fail_delete: bool,
}

/// A [`Platform`] whose VMs follow pre-recorded [`VmPlan`]s.
///
/// Each `create_vm` call takes the next queued plan; creating a VM with no
/// plan left fails with [`Error::CreateFailed`].
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, plan: VmPlan) -> Self {
        self.state.lock().unwrap().plans.push_back(plan);
        self
    }

    pub fn fail_delete(self) -> Self {
        self.state.lock().unwrap().fail_delete = true;
        self
    }

    pub fn created(&self) -> Vec<VmSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<VmHandle> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// How often the phase of `vm` has been queried.
    pub fn polls(&self, vm: &VmHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .vms
            .get(vm)
            .map_or(0, |v| v.polls)
    }

    /// The guest serving `vm`'s console, once it has been opened.
    pub fn guest(&self, vm: &VmHandle) -> Option<GuestHandle> {
        self.state
            .lock()
            .unwrap()
            .vms
            .get(vm)
            .and_then(|v| v.guest.clone())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn create_vm(&self, spec: &VmSpec) -> Result<VmHandle> {
        let mut state = self.state.lock().unwrap();
        let plan = state
            .plans
            .pop_front()
            .ok_or_else(|| Error::CreateFailed(format!("no plan left for {}", spec.name)))?;
        let handle = VmHandle::new(&spec.namespace, &spec.name);
        state.created.push(spec.clone());
        state.vms.insert(
            handle.clone(),
            FakeVm {
                plan,
                ..FakeVm::default()
            },
        );
        Ok(handle)
    }

    async fn vm_phase(&self, vm: &VmHandle) -> Result<VmPhase> {
        let step = {
            let mut state = self.state.lock().unwrap();
            let fake = state
                .vms
                .get_mut(vm)
                .ok_or_else(|| Error::Platform(format!("unknown VM {vm}")))?;
            fake.polls += 1;
            if fake.plan.phases.len() > 1 {
                fake.plan.phases.pop_front()
            } else {
                fake.plan.phases.front().cloned()
            }
        };
        match step {
            Some(PhaseStep::Phase(phase)) => Ok(phase),
            Some(PhaseStep::Error(message)) => Err(Error::Platform(message)),
            Some(PhaseStep::Hang) => std::future::pending().await,
            None => Ok(VmPhase::Pending),
        }
    }

    async fn open_console(
        &self,
        vm: &VmHandle,
        device: &str,
        _connect_timeout: Duration,
    ) -> Result<ConsoleStream> {
        let mut state = self.state.lock().unwrap();
        let fake = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| Error::Platform(format!("unknown VM {vm}")))?;
        let refuse = || Error::ConnectFailed {
            target: format!("{vm}:{device}"),
            reason: "console refused".to_string(),
        };
        if fake.plan.refuse_console {
            return Err(refuse());
        }
        let guest = fake.plan.guest.take().ok_or_else(refuse)?;
        let (stream, handle) = guest.spawn();
        fake.guest = Some(handle);
        Ok(stream)
    }

    async fn delete_vm(&self, vm: &VmHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(Error::Platform(format!("cannot delete {vm}")));
        }
        state.deleted.push(vm.clone());
        Ok(())
    }
}
