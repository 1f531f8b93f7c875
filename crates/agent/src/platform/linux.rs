use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use agent_core::{CpuVitals, DiskVitals, NtpInfo, UsageVitals, Vitals};
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use sysinfo::System;
use tracing::{info, warn};
use ulid::Ulid;
use walkdir::WalkDir;

use super::cmd::run_checked;
use super::{archive, DirProvider, Platform};

const PERSISTENT_NET_RULES: &str = "/etc/udev/rules.d/70-persistent-net.rules";

/// Linux implementation of OS primitives, shelling out to the usual system tools.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    dirs: DirProvider,
    proc_dir: PathBuf,
    /// Kept between calls so CPU usage covers the time since the previous sample.
    system: Arc<Mutex<System>>,
}

impl LinuxPlatform {
    pub fn new(dirs: DirProvider) -> Self {
        Self {
            dirs,
            proc_dir: PathBuf::from("/proc"),
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    async fn mounts(&self) -> anyhow::Result<Vec<(String, String)>> {
        let path = self.proc_dir.join("mounts");
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Reading {}", path.display()))?;
        Ok(parse_mounts(&text))
    }

    async fn disk_usage(&self, path: &Path) -> anyhow::Result<DiskVitals> {
        let out = run_checked("df", ["-P".as_ref(), path.as_os_str()]).await?;
        let percent = parse_df_percent(&out)
            .with_context(|| format!("Parsing df output for {}", path.display()))?;
        Ok(DiskVitals { percent })
    }

    /// Load, CPU, memory and swap; disks are filled in by the caller.
    async fn host_vitals(&self) -> anyhow::Result<Vitals> {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || {
            let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
            sys.refresh_cpu();
            sys.refresh_memory();

            let avg = System::load_average();
            let load: Vec<String> = [avg.one, avg.five, avg.fifteen]
                .iter()
                .map(|l| format!("{l:.2}"))
                .collect();
            // Aggregate busy time only; no per-mode split is available.
            let cpu = CpuVitals {
                user: format!("{:.1}", sys.global_cpu_info().cpu_usage()),
                sys: "0.0".to_string(),
                wait: "0.0".to_string(),
            };
            Vitals {
                load,
                cpu,
                mem: usage(sys.used_memory(), sys.total_memory()),
                swap: usage(sys.used_swap(), sys.total_swap()),
                disk: BTreeMap::new(),
            }
        })
        .await
        .context("Sampling host vitals")
    }
}

#[async_trait]
impl Platform for LinuxPlatform {
    async fn mount_persistent_disk(&self, device: &str, mount_point: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(mount_point)
            .await
            .with_context(|| format!("Creating mount point {}", mount_point.display()))?;
        info!(device, mount_point = %mount_point.display(), "mounting persistent disk");
        run_checked("mount", [device.as_ref(), mount_point.as_os_str()])
            .await
            .context("Mounting persistent disk")?;
        Ok(())
    }

    async fn unmount_persistent_disk(&self, device: &str) -> anyhow::Result<bool> {
        if !self.is_persistent_disk_mounted(device).await? {
            return Ok(false);
        }
        info!(device, "unmounting persistent disk");
        run_checked("umount", [device])
            .await
            .context("Unmounting persistent disk")?;
        Ok(true)
    }

    async fn is_persistent_disk_mounted(&self, device: &str) -> anyhow::Result<bool> {
        Ok(self.mounts().await?.iter().any(|(dev, _)| dev == device))
    }

    async fn is_mount_point(&self, path: &Path) -> anyhow::Result<bool> {
        let path = path.to_string_lossy();
        Ok(self.mounts().await?.iter().any(|(_, mp)| *mp == path))
    }

    async fn migrate_persistent_disk(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        info!(from = %from.display(), to = %to.display(), "migrating persistent disk");
        let src = format!("{}/.", from.display());
        run_checked("cp", ["-a".as_ref(), src.as_ref(), to.as_os_str()])
            .await
            .context("Copying persistent disk contents")?;
        run_checked("umount", [from])
            .await
            .context("Unmounting old persistent disk")?;
        run_checked("mount", ["--move".as_ref(), to.as_os_str(), from.as_os_str()])
            .await
            .context("Moving new persistent disk into place")?;
        Ok(())
    }

    async fn setup_ssh(&self, user: &str, public_key: &str) -> anyhow::Result<()> {
        let home = self.dirs.ssh_home_dir().join(user);
        if run_checked("id", [user]).await.is_err() {
            run_checked(
                "useradd",
                [
                    "-m".as_ref(),
                    "-d".as_ref(),
                    home.as_os_str(),
                    "-s".as_ref(),
                    "/bin/bash".as_ref(),
                    user.as_ref(),
                ],
            )
            .await
            .with_context(|| format!("Creating user {user}"))?;
        }
        let ssh_dir = home.join(".ssh");
        tokio::fs::create_dir_all(&ssh_dir)
            .await
            .with_context(|| format!("Creating {}", ssh_dir.display()))?;
        tokio::fs::write(ssh_dir.join("authorized_keys"), format!("{public_key}\n"))
            .await
            .context("Writing authorized_keys")?;
        run_checked("chown", ["-R".as_ref(), format!("{user}:{user}").as_ref(), home.as_os_str()])
            .await
            .context("Setting ssh dir ownership")?;
        Ok(())
    }

    async fn delete_ephemeral_users_matching(&self, pattern: &str) -> anyhow::Result<()> {
        let re = Regex::new(pattern).with_context(|| format!("Compiling user regex {pattern}"))?;
        let passwd = tokio::fs::read_to_string("/etc/passwd")
            .await
            .context("Reading /etc/passwd")?;
        for user in passwd.lines().filter_map(|l| l.split(':').next()) {
            if re.is_match(user) {
                info!(user, "deleting ephemeral user");
                run_checked("userdel", ["-r", user])
                    .await
                    .with_context(|| format!("Deleting user {user}"))?;
            }
        }
        Ok(())
    }

    async fn compress_files_in_dir(&self, dir: &Path, filters: &[String]) -> anyhow::Result<PathBuf> {
        let matchers = filters
            .iter()
            .map(|f| glob_to_regex(f))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable log entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let name = rel.to_string_lossy().replace('\\', "/");
            if matchers.iter().any(|m| m.is_match(&name)) {
                files.push(name);
            }
        }

        let tmp = self.dirs.tmp_dir();
        tokio::fs::create_dir_all(&tmp)
            .await
            .with_context(|| format!("Creating {}", tmp.display()))?;
        let tarball = tmp.join(format!("logs-{}.tgz", Ulid::new()));
        if let Err(e) = archive::pack_files(dir, files, &tarball).await {
            match tokio::fs::remove_file(&tarball).await {
                Err(rm) if rm.kind() != std::io::ErrorKind::NotFound => {
                    warn!(path = %tarball.display(), error = %rm, "failed to remove partial logs tarball");
                }
                _ => {}
            }
            return Err(e.context("Compressing files"));
        }
        Ok(tarball)
    }

    async fn prepare_for_network_change(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(PERSISTENT_NET_RULES).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Removing persistent network udev rules"),
        }
    }

    async fn vitals(&self) -> anyhow::Result<Vitals> {
        let mut vitals = self.host_vitals().await?;
        let disk = &mut vitals.disk;
        disk.insert("system".to_string(), self.disk_usage(Path::new("/")).await?);
        if let Ok(ephemeral) = self.disk_usage(&self.dirs.data_dir()).await {
            disk.insert("ephemeral".to_string(), ephemeral);
        }
        let store = self.dirs.store_dir();
        if self.is_mount_point(&store).await.unwrap_or(false) {
            disk.insert("persistent".to_string(), self.disk_usage(&store).await?);
        }
        Ok(vitals)
    }

    async fn ntp_info(&self) -> NtpInfo {
        let path = self.dirs.agent_logs_dir().join("ntpdate.out");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_ntpdate(&text).unwrap_or_default(),
            Err(_) => NtpInfo::default(),
        }
    }
}

fn parse_mounts(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some((fields.next()?.to_string(), fields.next()?.to_string()))
        })
        .collect()
}

/// Used share of a capacity given in bytes, as the monitor expects it: whole percent and KiB.
fn usage(used: u64, total: u64) -> UsageVitals {
    UsageVitals {
        percent: if total == 0 {
            "0".to_string()
        } else {
            (used.saturating_mul(100) / total).to_string()
        },
        kb: (used / 1024).to_string(),
    }
}

fn parse_df_percent(out: &str) -> Option<String> {
    let line = out.lines().nth(1)?;
    let capacity = line.split_whitespace().nth(4)?;
    Some(capacity.trim_end_matches('%').to_string())
}

/// Last `ntpdate` result, e.g.
/// `19 Oct 10:00:01 ntpdate[42]: adjust time server 10.0.0.1 offset -0.000413 sec`.
fn parse_ntpdate(text: &str) -> Option<NtpInfo> {
    let re = Regex::new(r"^(\d+ \w+ [\d:]+) ntpdate\[\d+\]: .*offset (-?[\d.]+) sec").ok()?;
    let caps = text.lines().rev().find_map(|l| re.captures(l.trim()))?;
    Some(NtpInfo {
        timestamp: caps[1].to_string(),
        offset: caps[2].to_string(),
    })
}

/// Shell-style glob where `*` stays within a path segment and `**/` spans directories.
fn glob_to_regex(glob: &str) -> anyhow::Result<Regex> {
    let mut re = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).with_context(|| format!("Invalid log filter '{glob}'"))
}
