use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A task identifier (UUID v4 string by convention).
pub type TaskId = String;

// ============================================================================
// Desired state
// ============================================================================

/// Reference to a blob in the blobstore plus its expected digest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobRef {
    /// Blobstore identifier.
    #[serde(default)]
    pub blobstore_id: String,
    /// Hex encoded SHA-1 of the blob content.
    #[serde(default)]
    pub sha1: String,
}

/// Compiled or source package descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub blobstore_id: String,
}

impl PackageSpec {
    /// Blob reference for fetching this package.
    pub fn blob(&self) -> BlobRef {
        BlobRef {
            blobstore_id: self.blobstore_id.clone(),
            sha1: self.sha1.clone(),
        }
    }
}

/// One job template within a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobTemplateSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub blobstore_id: String,
}

/// The job section of an apply spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    #[serde(default)]
    pub name: String,
    /// Name of the primary template; drain and errand scripts are looked up by it.
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub blobstore_id: String,
    #[serde(default)]
    pub templates: Vec<JobTemplateSpec>,
}

/// Desired-state descriptor the agent converges toward.
///
/// Fields the agent does not interpret are preserved in `extra` so a spec read from
/// disk and written back is not truncated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobSpec>,
    /// Package specs keyed by package name.
    #[serde(default)]
    pub packages: BTreeMap<String, PackageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_hash: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_templates_archive: Option<BlobRef>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ApplySpec {
    /// Template name of the running job, if any.
    pub fn job_template(&self) -> Option<&str> {
        self.job
            .as_ref()
            .map(|j| j.template.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Configuration hash, treating an empty string as absent.
    pub fn config_hash(&self) -> Option<&str> {
        self.configuration_hash.as_deref().filter(|h| !h.is_empty())
    }
}

/// A dependency of a package being compiled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileDependency {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub blobstore_id: String,
}

/// Dependencies of a package being compiled, keyed by name.
pub type CompileDependencies = BTreeMap<String, CompileDependency>;

// ============================================================================
// Settings
// ============================================================================

/// Agent settings supplied by the infrastructure at boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub blobstore: BlobstoreSettings,
    #[serde(default)]
    pub disks: DiskSettings,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSettings>,
    #[serde(default)]
    pub ntp: Vec<String>,
    #[serde(default)]
    pub mbus: String,
    #[serde(default)]
    pub vm: VmSettings,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
}

impl Settings {
    /// Device path of the persistent disk with the given volume id.
    pub fn persistent_disk_path(&self, volume_id: &str) -> Option<&str> {
        self.disks.persistent.get(volume_id).map(String::as_str)
    }

    /// IP of the network marked default for the gateway, falling back to the first network.
    pub fn default_ip(&self) -> Option<&str> {
        self.networks
            .values()
            .find(|n| n.default.iter().any(|d| d == "gateway"))
            .or_else(|| self.networks.values().next())
            .map(|n| n.ip.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BlobstoreSettings {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskSettings {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub ephemeral: String,
    /// Volume id -> device path.
    #[serde(default)]
    pub persistent: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkSettings {
    #[serde(default, rename = "type")]
    pub network_type: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub default: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmSettings {
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// Wire envelopes
// ============================================================================

/// Inbound directive as it arrives on the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    /// Action name, e.g. `apply` or `get_task`.
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    /// Reply subject, echoed for transports that route replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Payload handed to the runner: `{"arguments": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// Reply to a directive: `{"value": ...}` or `{"exception": {"message": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Value(Value),
    Exception(ExceptionBody),
}

impl Reply {
    /// Build an exception reply from any displayable error.
    pub fn exception(message: impl std::fmt::Display) -> Self {
        Self::Exception(ExceptionBody {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceptionBody {
    pub message: String,
}

/// Lifecycle state of an asynchronous task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskState {
    /// True for `Done`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// Handle returned for a task that has not finished yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStateEnvelope {
    pub agent_task_id: TaskId,
    pub state: TaskState,
}

// ============================================================================
// State reporting
// ============================================================================

/// Result of `get_state`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateEnvelope {
    #[serde(flatten)]
    pub spec: ApplySpec,
    pub agent_id: String,
    pub bosh_protocol: String,
    pub job_state: String,
    pub vm: VmSettings,
    pub ntp: NtpInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vitals>,
}

/// Periodic liveness report pushed to the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heartbeat {
    /// Job name from the current spec, if one has been applied.
    pub job: Option<String>,
    pub index: Option<u64>,
    pub job_state: String,
    pub vitals: Vitals,
    pub ntp: NtpInfo,
}

/// NTP offset as last reported by the time service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NtpInfo {
    #[serde(default)]
    pub offset: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Host vitals, rendered as strings the way the monitor expects them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vitals {
    pub load: Vec<String>,
    pub cpu: CpuVitals,
    pub mem: UsageVitals,
    pub swap: UsageVitals,
    pub disk: BTreeMap<String, DiskVitals>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuVitals {
    pub user: String,
    pub sys: String,
    pub wait: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageVitals {
    pub percent: String,
    pub kb: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskVitals {
    pub percent: String,
}

// ============================================================================
// Action results
// ============================================================================

/// Outcome of an errand run; a non-zero exit code is still a successful action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Result of `compile_package`: `{"result": {"blobstore_id", "sha1"}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileResult {
    pub result: BlobRef,
}
