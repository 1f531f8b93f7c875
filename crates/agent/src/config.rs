use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::platform::DirProvider;

#[derive(Debug, Clone, Parser)]
#[command(name = "host-agent", version, about = "Host agent executing orchestrator directives")]
pub struct AgentConfig {
    /// Listen address for the message-bus endpoint.
    #[arg(long, default_value = "127.0.0.1:6868")]
    pub listen: SocketAddr,

    /// Agent base directory.
    #[arg(long, default_value = "/var/vcap")]
    pub base_dir: PathBuf,

    /// Settings JSON file. Defaults to `<base-dir>/bosh/settings.json`.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Where shutdown notifications and heartbeats are POSTed. Unset disables both.
    #[arg(long)]
    pub mbus_notify_url: Option<String>,

    /// Default log filter (env-filter syntax); `RUST_LOG` wins when set.
    #[arg(long, default_value = "info")]
    pub log: String,

    /// How often finished tasks are pruned.
    #[arg(long, default_value_t = 60)]
    pub task_gc_interval_seconds: u64,

    /// How long a finished task stays queryable through `get_task`.
    #[arg(long, default_value_t = 3600)]
    pub task_retention_seconds: u64,

    /// Heartbeat period; `0` disables heartbeats.
    #[arg(long, default_value_t = 60)]
    pub heartbeat_interval_seconds: u64,

    /// Delay before the agent exits to apply new network configuration.
    #[arg(long, default_value_t = 5)]
    pub network_restart_delay_seconds: u64,
}

impl AgentConfig {
    pub fn dirs(&self) -> DirProvider {
        DirProvider::new(&self.base_dir)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(|| self.dirs().settings_path())
    }

    pub fn task_gc_interval(&self) -> Duration {
        Duration::from_secs(self.task_gc_interval_seconds.max(1))
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_seconds)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_seconds > 0)
            .then(|| Duration::from_secs(self.heartbeat_interval_seconds))
    }

    pub fn network_restart_delay(&self) -> Duration {
        Duration::from_secs(self.network_restart_delay_seconds)
    }
}
