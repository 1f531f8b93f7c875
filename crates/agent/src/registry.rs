//! Closed mapping from directive names to actions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::action::{Action, Typed};
use crate::actions::*;
use crate::error::AgentError;
use crate::platform::{
    AgentKiller, Applier, Blobstore, Compiler, DirProvider, DrainScriptProvider, ErrandRunner,
    JobSupervisor, Notifier, Platform, SettingsService, SpecService,
};
use crate::task::TaskService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Apply,
    Drain,
    FetchLogs,
    GetTask,
    CancelTask,
    GetState,
    ListDisk,
    MigrateDisk,
    MountDisk,
    UnmountDisk,
    Ping,
    PrepareNetworkChange,
    PrepareConfigureNetworks,
    ConfigureNetworks,
    Ssh,
    Start,
    Stop,
    CompilePackage,
    RunErrand,
    Prepare,
    ReleaseApplySpec,
}

impl ActionKind {
    pub const ALL: [ActionKind; 21] = [
        ActionKind::Apply,
        ActionKind::Drain,
        ActionKind::FetchLogs,
        ActionKind::GetTask,
        ActionKind::CancelTask,
        ActionKind::GetState,
        ActionKind::ListDisk,
        ActionKind::MigrateDisk,
        ActionKind::MountDisk,
        ActionKind::UnmountDisk,
        ActionKind::Ping,
        ActionKind::PrepareNetworkChange,
        ActionKind::PrepareConfigureNetworks,
        ActionKind::ConfigureNetworks,
        ActionKind::Ssh,
        ActionKind::Start,
        ActionKind::Stop,
        ActionKind::CompilePackage,
        ActionKind::RunErrand,
        ActionKind::Prepare,
        ActionKind::ReleaseApplySpec,
    ];

    /// Canonical directive name.
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Apply => "apply",
            ActionKind::Drain => "drain",
            ActionKind::FetchLogs => "fetch_logs",
            ActionKind::GetTask => "get_task",
            ActionKind::CancelTask => "cancel_task",
            ActionKind::GetState => "get_state",
            ActionKind::ListDisk => "list_disk",
            ActionKind::MigrateDisk => "migrate_disk",
            ActionKind::MountDisk => "mount_disk",
            ActionKind::UnmountDisk => "unmount_disk",
            ActionKind::Ping => "ping",
            ActionKind::PrepareNetworkChange => "prepare_network_change",
            ActionKind::PrepareConfigureNetworks => "prepare_configure_networks",
            ActionKind::ConfigureNetworks => "configure_networks",
            ActionKind::Ssh => "ssh",
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::CompilePackage => "compile_package",
            ActionKind::RunErrand => "run_errand",
            ActionKind::Prepare => "prepare",
            ActionKind::ReleaseApplySpec => "release_apply_spec",
        }
    }

    /// Resolve a directive name, including the historical aliases `logs` and `state`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "logs" => Some(ActionKind::FetchLogs),
            "state" => Some(ActionKind::GetState),
            _ => Self::ALL.into_iter().find(|k| k.name() == name),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| AgentError::UnknownAction(s.to_string()))
    }
}

/// Collaborators wired once at startup and shared by every action.
#[derive(Clone)]
pub struct AgentDeps {
    pub settings: Arc<dyn SettingsService>,
    pub specs: Arc<dyn SpecService>,
    pub platform: Arc<dyn Platform>,
    pub blobstore: Arc<dyn Blobstore>,
    pub applier: Arc<dyn Applier>,
    pub supervisor: Arc<dyn JobSupervisor>,
    pub notifier: Arc<dyn Notifier>,
    pub drain_scripts: Arc<dyn DrainScriptProvider>,
    pub compiler: Arc<dyn Compiler>,
    pub errands: Arc<dyn ErrandRunner>,
    pub killer: Arc<dyn AgentKiller>,
    pub tasks: TaskService,
    pub dirs: DirProvider,
    pub network_restart_delay: Duration,
}

/// Builds a fresh action per directive; construction does no I/O.
#[derive(Clone)]
pub struct ActionFactory {
    deps: AgentDeps,
}

impl ActionFactory {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    pub fn tasks(&self) -> &TaskService {
        &self.deps.tasks
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn Action>, AgentError> {
        let kind: ActionKind = name.parse()?;
        Ok(self.build(kind))
    }

    pub fn build(&self, kind: ActionKind) -> Arc<dyn Action> {
        let d = &self.deps;
        match kind {
            ActionKind::Apply => Arc::new(Typed(ApplyAction::new(
                Arc::clone(&d.applier),
                Arc::clone(&d.specs),
            ))),
            ActionKind::Drain => Arc::new(Typed(DrainAction::new(
                Arc::clone(&d.specs),
                Arc::clone(&d.drain_scripts),
                Arc::clone(&d.notifier),
                Arc::clone(&d.supervisor),
            ))),
            ActionKind::FetchLogs => Arc::new(Typed(FetchLogsAction::new(
                Arc::clone(&d.platform),
                Arc::clone(&d.blobstore),
                d.dirs.clone(),
            ))),
            ActionKind::GetTask => Arc::new(Typed(GetTaskAction::new(d.tasks.clone()))),
            ActionKind::CancelTask => Arc::new(Typed(CancelTaskAction::new(d.tasks.clone()))),
            ActionKind::GetState => Arc::new(Typed(GetStateAction::new(
                Arc::clone(&d.settings),
                Arc::clone(&d.specs),
                Arc::clone(&d.supervisor),
                Arc::clone(&d.platform),
            ))),
            ActionKind::ListDisk => Arc::new(Typed(ListDiskAction::new(
                Arc::clone(&d.settings),
                Arc::clone(&d.platform),
            ))),
            ActionKind::MigrateDisk => Arc::new(Typed(MigrateDiskAction::new(
                Arc::clone(&d.platform),
                d.dirs.clone(),
            ))),
            ActionKind::MountDisk => Arc::new(Typed(MountDiskAction::new(
                Arc::clone(&d.settings),
                Arc::clone(&d.platform),
                d.dirs.clone(),
            ))),
            ActionKind::UnmountDisk => Arc::new(Typed(UnmountDiskAction::new(
                Arc::clone(&d.settings),
                Arc::clone(&d.platform),
            ))),
            ActionKind::Ping => Arc::new(Typed(PingAction)),
            ActionKind::PrepareNetworkChange => Arc::new(Typed(PrepareNetworkChangeAction::new(
                Arc::clone(&d.settings),
                Arc::clone(&d.platform),
            ))),
            ActionKind::PrepareConfigureNetworks => {
                Arc::new(Typed(PrepareConfigureNetworksAction::new(
                    Arc::clone(&d.settings),
                    Arc::clone(&d.platform),
                )))
            }
            ActionKind::ConfigureNetworks => Arc::new(Typed(ConfigureNetworksAction::new(
                Arc::clone(&d.killer),
                d.network_restart_delay,
            ))),
            ActionKind::Ssh => Arc::new(Typed(SshAction::new(
                Arc::clone(&d.settings),
                Arc::clone(&d.platform),
            ))),
            ActionKind::Start => Arc::new(Typed(StartAction::new(Arc::clone(&d.supervisor)))),
            ActionKind::Stop => Arc::new(Typed(StopAction::new(Arc::clone(&d.supervisor)))),
            ActionKind::CompilePackage => Arc::new(Typed(CompilePackageAction::new(Arc::clone(
                &d.compiler,
            )))),
            ActionKind::RunErrand => Arc::new(Typed(RunErrandAction::new(
                Arc::clone(&d.specs),
                Arc::clone(&d.errands),
            ))),
            ActionKind::Prepare => Arc::new(Typed(PrepareAction::new(Arc::clone(&d.applier)))),
            ActionKind::ReleaseApplySpec => {
                Arc::new(Typed(ReleaseApplySpecAction::new(d.dirs.clone())))
            }
        }
    }
}
