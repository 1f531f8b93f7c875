//! In-memory collaborators and a dispatcher wired to them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{
    ApplySpec, BlobRef, CompileDependencies, DrainParams, ErrandResult, Heartbeat, NtpInfo,
    PackageSpec, Reply, Settings, TaskState, Vitals,
};
use async_trait::async_trait;
use host_agent::platform::{
    AgentKiller, Applier, Blobstore, Compiler, DirProvider, DrainScriptProvider, ErrandRunner,
    JobSupervisor, Notifier, Platform, SettingsService, SpecService,
};
use host_agent::task_store::TaskStore;
use host_agent::{ActionDispatcher, ActionFactory, AgentDeps, TaskService};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Ordered log of collaborator calls shared by the fakes.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

#[derive(Default)]
pub struct FakeSpecs {
    pub spec: Mutex<ApplySpec>,
}

#[async_trait]
impl SpecService for FakeSpecs {
    async fn get(&self) -> anyhow::Result<ApplySpec> {
        Ok(self.spec.lock().unwrap().clone())
    }

    async fn set(&self, spec: &ApplySpec) -> anyhow::Result<()> {
        *self.spec.lock().unwrap() = spec.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSettings {
    pub settings: Mutex<Settings>,
    pub refreshed: AtomicUsize,
    pub invalidated: AtomicUsize,
}

#[async_trait]
impl SettingsService for FakeSettings {
    async fn settings(&self) -> anyhow::Result<Settings> {
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn refresh(&self) -> anyhow::Result<Settings> {
        self.refreshed.fetch_add(1, Ordering::SeqCst);
        self.settings().await
    }

    async fn invalidate(&self) -> anyhow::Result<()> {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePlatform {
    pub events: Events,
    pub mounted: Mutex<Vec<String>>,
    pub store_is_mount_point: AtomicBool,
}

#[async_trait]
impl Platform for FakePlatform {
    async fn mount_persistent_disk(&self, device: &str, mount_point: &Path) -> anyhow::Result<()> {
        self.events
            .push(format!("mount {device} {}", mount_point.display()));
        self.mounted.lock().unwrap().push(device.to_string());
        Ok(())
    }

    async fn unmount_persistent_disk(&self, device: &str) -> anyhow::Result<bool> {
        self.events.push(format!("umount {device}"));
        let mut mounted = self.mounted.lock().unwrap();
        let before = mounted.len();
        mounted.retain(|d| d != device);
        Ok(mounted.len() != before)
    }

    async fn is_persistent_disk_mounted(&self, device: &str) -> anyhow::Result<bool> {
        Ok(self.mounted.lock().unwrap().iter().any(|d| d == device))
    }

    async fn is_mount_point(&self, _path: &Path) -> anyhow::Result<bool> {
        Ok(self.store_is_mount_point.load(Ordering::SeqCst))
    }

    async fn migrate_persistent_disk(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        self.events
            .push(format!("migrate {} {}", from.display(), to.display()));
        Ok(())
    }

    async fn setup_ssh(&self, user: &str, _public_key: &str) -> anyhow::Result<()> {
        self.events.push(format!("setup_ssh {user}"));
        Ok(())
    }

    async fn delete_ephemeral_users_matching(&self, pattern: &str) -> anyhow::Result<()> {
        self.events.push(format!("delete_users {pattern}"));
        Ok(())
    }

    async fn compress_files_in_dir(
        &self,
        dir: &Path,
        filters: &[String],
    ) -> anyhow::Result<PathBuf> {
        self.events
            .push(format!("compress {} {}", dir.display(), filters.join(",")));
        Ok(dir.join("logs.tgz"))
    }

    async fn prepare_for_network_change(&self) -> anyhow::Result<()> {
        self.events.push("prepare_network");
        Ok(())
    }

    async fn vitals(&self) -> anyhow::Result<Vitals> {
        Ok(Vitals {
            load: vec!["0.10".into(), "0.20".into(), "0.30".into()],
            ..Vitals::default()
        })
    }

    async fn ntp_info(&self) -> NtpInfo {
        NtpInfo {
            offset: "0.0002".into(),
            timestamp: "18 Oct 10:00:00".into(),
        }
    }
}

pub struct FakeBlobstore {
    pub events: Events,
}

#[async_trait]
impl Blobstore for FakeBlobstore {
    async fn get(&self, blob_id: &str, _sha1: &str) -> anyhow::Result<PathBuf> {
        Ok(PathBuf::from("/blobs").join(blob_id))
    }

    async fn create(&self, path: &Path) -> anyhow::Result<BlobRef> {
        self.events.push(format!("upload {}", path.display()));
        Ok(BlobRef {
            blobstore_id: "blob-1".into(),
            sha1: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
        })
    }
}

/// Applier that can be held until the test releases it.
pub struct FakeApplier {
    pub events: Events,
    pub hold: AtomicBool,
    pub release: Notify,
    pub fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl Applier for FakeApplier {
    async fn prepare(&self, desired: &ApplySpec) -> anyhow::Result<()> {
        self.events.push(format!(
            "prepare {}",
            desired.job_template().unwrap_or_default()
        ));
        Ok(())
    }

    async fn apply(&self, _current: &ApplySpec, desired: &ApplySpec) -> anyhow::Result<()> {
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            anyhow::bail!(msg);
        }
        self.events.push(format!(
            "apply {}",
            desired.config_hash().unwrap_or_default()
        ));
        Ok(())
    }
}

pub struct FakeSupervisor {
    pub events: Events,
}

#[async_trait]
impl JobSupervisor for FakeSupervisor {
    async fn start(&self) -> anyhow::Result<()> {
        self.events.push("start");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.events.push("stop");
        Ok(())
    }

    async fn unmonitor(&self) -> anyhow::Result<()> {
        self.events.push("unmonitor");
        Ok(())
    }

    async fn reload(&self) -> anyhow::Result<()> {
        self.events.push("reload");
        Ok(())
    }

    async fn status(&self) -> String {
        "running".into()
    }
}

pub struct FakeNotifier {
    pub events: Events,
    pub fail: AtomicBool,
    pub heartbeats: Mutex<Vec<Heartbeat>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify_shutdown(&self) -> anyhow::Result<()> {
        self.events.push("notify_shutdown");
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("nats unreachable");
        }
        Ok(())
    }

    async fn heartbeat(&self, beat: &Heartbeat) -> anyhow::Result<()> {
        self.events.push("heartbeat");
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("nats unreachable");
        }
        self.heartbeats.lock().unwrap().push(beat.clone());
        Ok(())
    }
}

pub struct FakeDrainScripts {
    pub events: Events,
    pub exists: AtomicBool,
    pub result: AtomicI64,
    pub calls: Mutex<Vec<(String, DrainParams)>>,
}

#[async_trait]
impl DrainScriptProvider for FakeDrainScripts {
    fn exists(&self, _template: &str) -> bool {
        self.exists.load(Ordering::SeqCst)
    }

    async fn run(&self, template: &str, params: &DrainParams) -> anyhow::Result<i64> {
        self.events.push("drain_script");
        self.calls
            .lock()
            .unwrap()
            .push((template.to_string(), params.clone()));
        Ok(self.result.load(Ordering::SeqCst))
    }
}

pub struct FakeCompiler {
    pub compiled: Mutex<Vec<(PackageSpec, CompileDependencies)>>,
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(
        &self,
        package: &PackageSpec,
        deps: &CompileDependencies,
    ) -> anyhow::Result<BlobRef> {
        self.compiled
            .lock()
            .unwrap()
            .push((package.clone(), deps.clone()));
        Ok(BlobRef {
            blobstore_id: format!("compiled-{}", package.name),
            sha1: "c0ffee".into(),
        })
    }
}

/// Errand that runs until cancelled unless `finish` is set.
pub struct FakeErrands {
    pub finish: AtomicBool,
}

#[async_trait]
impl ErrandRunner for FakeErrands {
    async fn run(&self, template: &str, cancel: CancellationToken) -> anyhow::Result<ErrandResult> {
        if self.finish.load(Ordering::SeqCst) {
            return Ok(ErrandResult {
                stdout: format!("{template} ok\n"),
                stderr: String::new(),
                exit_code: 0,
            });
        }
        cancel.cancelled().await;
        anyhow::bail!("{template} was cancelled")
    }
}

#[derive(Default)]
pub struct FakeKiller {
    pub delays: Mutex<Vec<Duration>>,
}

impl AgentKiller for FakeKiller {
    fn kill_after(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub events: Events,
    pub specs: Arc<FakeSpecs>,
    pub settings: Arc<FakeSettings>,
    pub platform: Arc<FakePlatform>,
    pub applier: Arc<FakeApplier>,
    pub notifier: Arc<FakeNotifier>,
    pub drain: Arc<FakeDrainScripts>,
    pub compiler: Arc<FakeCompiler>,
    pub errands: Arc<FakeErrands>,
    pub killer: Arc<FakeKiller>,
    pub tasks: TaskService,
    pub deps: AgentDeps,
    pub dispatcher: ActionDispatcher,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(DirProvider::new(dir.path()).tasks_path());
        Self::with_dir(dir, TaskService::with_store(store))
    }

    /// A harness over an existing base dir, as after an agent restart.
    pub fn with_dir(dir: TempDir, tasks: TaskService) -> Self {
        let events = Events::default();
        let specs = Arc::new(FakeSpecs::default());
        let settings = Arc::new(FakeSettings::default());
        let platform = Arc::new(FakePlatform {
            events: events.clone(),
            mounted: Mutex::new(Vec::new()),
            store_is_mount_point: AtomicBool::new(false),
        });
        let applier = Arc::new(FakeApplier {
            events: events.clone(),
            hold: AtomicBool::new(false),
            release: Notify::new(),
            fail_with: Mutex::new(None),
        });
        let notifier = Arc::new(FakeNotifier {
            events: events.clone(),
            fail: AtomicBool::new(false),
            heartbeats: Mutex::new(Vec::new()),
        });
        let drain = Arc::new(FakeDrainScripts {
            events: events.clone(),
            exists: AtomicBool::new(true),
            result: AtomicI64::new(0),
            calls: Mutex::new(Vec::new()),
        });
        let compiler = Arc::new(FakeCompiler {
            compiled: Mutex::new(Vec::new()),
        });
        let errands = Arc::new(FakeErrands {
            finish: AtomicBool::new(false),
        });
        let killer = Arc::new(FakeKiller::default());

        let deps = AgentDeps {
            settings: settings.clone(),
            specs: specs.clone(),
            platform: platform.clone(),
            blobstore: Arc::new(FakeBlobstore {
                events: events.clone(),
            }),
            applier: applier.clone(),
            supervisor: Arc::new(FakeSupervisor {
                events: events.clone(),
            }),
            notifier: notifier.clone(),
            drain_scripts: drain.clone(),
            compiler: compiler.clone(),
            errands: errands.clone(),
            killer: killer.clone(),
            tasks: tasks.clone(),
            dirs: DirProvider::new(dir.path()),
            network_restart_delay: Duration::from_secs(5),
        };

        Self {
            dir,
            events,
            specs,
            settings,
            platform,
            applier,
            notifier,
            drain,
            compiler,
            errands,
            killer,
            tasks,
            deps: deps.clone(),
            dispatcher: ActionDispatcher::new(ActionFactory::new(deps)),
        }
    }

    pub fn dirs(&self) -> DirProvider {
        DirProvider::new(self.dir.path())
    }

    pub fn set_current_spec(&self, spec: Value) {
        *self.specs.spec.lock().unwrap() = serde_json::from_value(spec).unwrap();
    }

    pub fn set_settings(&self, settings: Value) {
        *self.settings.settings.lock().unwrap() = serde_json::from_value(settings).unwrap();
    }

    pub async fn call(&self, method: &str, arguments: Value) -> Reply {
        let payload = serde_json::to_vec(&json!({ "arguments": arguments })).unwrap();
        self.dispatcher.dispatch(method, &payload).await
    }

    /// Dispatch an asynchronous directive and return its task id.
    pub async fn start_task(&self, method: &str, arguments: Value) -> String {
        match self.call(method, arguments).await {
            Reply::Value(v) => {
                assert_eq!(v["state"], "running", "unexpected reply {v}");
                v["agent_task_id"].as_str().unwrap().to_string()
            }
            Reply::Exception(e) => panic!("{method} failed: {}", e.message),
        }
    }

    /// Poll until the task leaves `Running`.
    pub async fn wait_for(&self, task_id: &str) -> TaskState {
        for _ in 0..200 {
            let task = self.tasks.find_task(task_id).expect("task exists");
            if task.state.is_terminal() {
                return task.state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not finish");
    }
}

pub fn value(reply: Reply) -> Value {
    match reply {
        Reply::Value(v) => v,
        Reply::Exception(e) => panic!("expected value, got exception: {}", e.message),
    }
}

pub fn exception(reply: Reply) -> String {
    match reply {
        Reply::Exception(e) => e.message,
        Reply::Value(v) => panic!("expected exception, got value: {v}"),
    }
}
