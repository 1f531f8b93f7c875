//! One type per directive.

mod apply;
mod compile;
mod disk;
mod drain;
mod errand;
mod logs;
mod misc;
mod network;
mod ssh;
mod state;
mod tasks;

pub use apply::{ApplyAction, PrepareAction};
pub use compile::CompilePackageAction;
pub use disk::{ListDiskAction, MigrateDiskAction, MountDiskAction, UnmountDiskAction};
pub use drain::{DrainAction, DrainArgs};
pub use errand::RunErrandAction;
pub use logs::{FetchLogsAction, LogsResult};
pub use misc::{PingAction, ReleaseApplySpecAction, StartAction, StopAction};
pub use network::{ConfigureNetworksAction, PrepareConfigureNetworksAction, PrepareNetworkChangeAction};
pub use ssh::{SshAction, SshParams, SshResult};
pub use state::GetStateAction;
pub use tasks::{CancelTaskAction, GetTaskAction};
