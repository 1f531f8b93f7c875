use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use host_agent::config::AgentConfig;
use host_agent::heartbeat::Heartbeater;
use host_agent::platform::{
    Blobstore, BlobApplier, FileSettingsService, FileSpecService, HttpNotifier,
    JobDrainScriptProvider, JobErrandRunner, JobSupervisor, LinuxPlatform, LocalBlobstore,
    MonitJobSupervisor, PackageCompiler, ProcessAgentKiller, SettingsService,
};
use host_agent::task_store::TaskStore;
use host_agent::{http, ActionDispatcher, ActionFactory, AgentDeps, TaskService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AgentConfig::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log)),
        )
        .init();

    let dirs = cfg.dirs();
    let settings: Arc<dyn SettingsService> =
        Arc::new(FileSettingsService::new(cfg.settings_path()));
    let blobstore: Arc<dyn Blobstore> = Arc::new(LocalBlobstore::new(dirs.blobs_dir()));
    let supervisor: Arc<dyn JobSupervisor> = Arc::new(MonitJobSupervisor::new("monit"));
    let notifier = HttpNotifier::new(cfg.mbus_notify_url.clone(), Arc::clone(&settings))
        .context("Building notifier")?;
    let tasks = TaskService::with_store(TaskStore::new(dirs.tasks_path()));

    let deps = AgentDeps {
        settings,
        specs: Arc::new(FileSpecService::new(dirs.spec_path())),
        platform: Arc::new(LinuxPlatform::new(dirs.clone())),
        blobstore: Arc::clone(&blobstore),
        applier: Arc::new(BlobApplier::new(
            Arc::clone(&blobstore),
            Arc::clone(&supervisor),
            dirs.clone(),
        )),
        supervisor,
        notifier: Arc::new(notifier),
        drain_scripts: Arc::new(JobDrainScriptProvider::new(dirs.jobs_dir())),
        compiler: Arc::new(PackageCompiler::new(blobstore, dirs.clone())),
        errands: Arc::new(JobErrandRunner::new(dirs.jobs_dir())),
        killer: Arc::new(ProcessAgentKiller),
        tasks: tasks.clone(),
        dirs,
        network_restart_delay: cfg.network_restart_delay(),
    };
    let heartbeater = Heartbeater::new(&deps);
    let dispatcher = Arc::new(ActionDispatcher::new(ActionFactory::new(deps)));

    match dispatcher.resume_persisted().await {
        Ok(0) => {}
        Ok(n) => info!(count = n, "resumed persistent tasks"),
        Err(e) => warn!(error = %format!("{e:#}"), "failed to resume persistent tasks"),
    }

    {
        let tasks = tasks.clone();
        let every = cfg.task_gc_interval();
        let retention = cfg.task_retention();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let pruned = tasks.prune_finished(retention);
                if pruned > 0 {
                    info!(pruned, remaining = tasks.len(), "pruned finished tasks");
                }
            }
        });
    }

    match cfg.heartbeat_interval() {
        Some(every) => {
            heartbeater.spawn(every);
        }
        None => warn!("heartbeats are disabled"),
    }

    let app = http::router(dispatcher);
    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("Binding {}", cfg.listen))?;
    info!(listen = %cfg.listen, base_dir = %cfg.base_dir.display(), "agent starting");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
