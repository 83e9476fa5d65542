use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::error::{ProvisionError, Result};
use crate::models::{ProcessStatus, ReadinessCheck, SupervisedProcess};
use crate::services::state::ProcessRecordStore;

const DEFAULT_GRACE: Duration = Duration::from_secs(10);
const KILL_WAIT: Duration = Duration::from_secs(5);
const EXIT_POLL: Duration = Duration::from_millis(100);

/// A fully rendered process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub binary: String,
    pub args: Vec<String>,
    pub log_file: PathBuf,
}

/// Starts and stops the daemons of a service.
///
/// Launched processes are detached and outlive the orchestrator. Each
/// generation is recorded with its PID and kernel start time so the next run
/// signals exactly those processes and nothing that happens to reuse a PID.
pub struct Supervisor {
    grace: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            grace: DEFAULT_GRACE,
        }
    }

    /// Time a process gets between SIGTERM and SIGKILL.
    pub fn with_grace(grace: Duration) -> Self {
        Self { grace }
    }

    /// Stop the previous generation, then launch `specs` in order.
    pub async fn supervise(
        &self,
        service: &str,
        specs: &[LaunchSpec],
        store: &ProcessRecordStore,
        working_dir: Option<&Path>,
    ) -> Result<Vec<SupervisedProcess>> {
        let stopped = self.stop(store).await?;
        if stopped > 0 {
            tracing::info!(service, stopped, "stopped previous generation");
        }

        let mut launched = Vec::with_capacity(specs.len());
        for spec in specs {
            let process = launch(service, spec, working_dir)?;
            tracing::info!(
                service,
                pid = process.pid,
                binary = %process.binary,
                log = %process.log_file.display(),
                "launched"
            );
            launched.push(process);
            // Record as we go so a later launch failure does not orphan earlier ones.
            store.save(&launched).await?;
        }
        Ok(launched)
    }

    /// Stop every recorded process of a service. Returns how many were signalled.
    pub async fn stop(&self, store: &ProcessRecordStore) -> Result<usize> {
        let records = store.load().await?;
        let mut stopped = 0;
        for record in &records {
            match status_of(record) {
                ProcessStatus::Running => {
                    self.terminate(record).await?;
                    stopped += 1;
                }
                ProcessStatus::Reused => {
                    tracing::warn!(
                        service = %record.service,
                        pid = record.pid,
                        "recorded pid now belongs to another process, not signalling"
                    );
                }
                ProcessStatus::Exited if group_alive(record.pid) => {
                    tracing::warn!(
                        service = %record.service,
                        pid = record.pid,
                        "leader exited but its process group is still alive, stopping the group"
                    );
                    self.terminate(record).await?;
                    stopped += 1;
                }
                ProcessStatus::Exited => {
                    tracing::debug!(service = %record.service, pid = record.pid, "already exited");
                }
            }
        }
        store.clear().await?;
        Ok(stopped)
    }

    async fn terminate(&self, record: &SupervisedProcess) -> Result<()> {
        tracing::debug!(pid = record.pid, "sending SIGTERM");
        signal(record.pid, Signal::Term);
        if wait_for_exit(record, self.grace).await {
            return Ok(());
        }

        tracing::warn!(pid = record.pid, "did not exit after SIGTERM, sending SIGKILL");
        signal(record.pid, Signal::Kill);
        if wait_for_exit(record, KILL_WAIT).await {
            return Ok(());
        }
        Err(ProvisionError::Process(format!(
            "process {} of '{}' survived SIGKILL",
            record.pid, record.service
        )))
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Recorded processes of a service with their current liveness.
pub async fn status(store: &ProcessRecordStore) -> Result<Vec<(SupervisedProcess, ProcessStatus)>> {
    let records = store.load().await?;
    Ok(records
        .into_iter()
        .map(|r| {
            let status = status_of(&r);
            (r, status)
        })
        .collect())
}

/// Spawn one detached process with stdout/stderr appended to its log file.
fn launch(service: &str, spec: &LaunchSpec, working_dir: Option<&Path>) -> Result<SupervisedProcess> {
    if let Some(parent) = spec.log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&spec.log_file)?;

    // std::process rather than tokio: the child is never awaited.
    let mut cmd = std::process::Command::new(&spec.binary);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log));
    if let Some(dir) = working_dir.filter(|d| d.is_dir()) {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group: no terminal signals from the caller, and the
        // whole group can be stopped at once.
        cmd.process_group(0);
    }

    let child = cmd.spawn().map_err(|e| {
        ProvisionError::Process(format!("failed to launch {} for '{service}': {e}", spec.binary))
    })?;
    let pid = child.id();

    Ok(SupervisedProcess {
        service: service.to_string(),
        binary: spec.binary.clone(),
        args: spec.args.clone(),
        pid,
        start_time: start_time(pid),
        log_file: spec.log_file.clone(),
        launched_at: Utc::now(),
    })
}

/// Whether the recorded process and everything left in its group are gone.
fn is_gone(record: &SupervisedProcess) -> bool {
    match status_of(record) {
        ProcessStatus::Running => false,
        ProcessStatus::Reused => true,
        ProcessStatus::Exited => !group_alive(record.pid),
    }
}

async fn wait_for_exit(record: &SupervisedProcess, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if is_gone(record) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL).await;
    }
}

/// Poll `check.url` until it answers 2xx or the timeout expires.
pub async fn wait_until_ready(service: &str, check: &ReadinessCheck) -> Result<()> {
    let timeout = Duration::from_secs(check.timeout_secs);
    let interval = Duration::from_millis(check.interval_ms);
    let request_timeout = interval.max(Duration::from_secs(1)).min(timeout);
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .build()?;

    tracing::info!(service, url = %check.url, timeout_secs = check.timeout_secs, "waiting for readiness");
    let poll = async {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match client.get(&check.url).send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    tracing::debug!(service, attempt, status = %response.status(), "not ready")
                }
                Err(e) => tracing::debug!(service, attempt, error = %e, "not ready"),
            }
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(()) => {
            tracing::info!(service, "ready");
            Ok(())
        }
        Err(_) => Err(ProvisionError::ServiceDidNotStart {
            service: service.to_string(),
            url: check.url.clone(),
            timeout_secs: check.timeout_secs,
        }),
    }
}

/// Liveness of the recorded group leader alone.
fn status_of(record: &SupervisedProcess) -> ProcessStatus {
    match probe_pid(record.pid) {
        None => ProcessStatus::Exited,
        Some(current) => match (record.start_time, current) {
            (Some(recorded), Some(now)) if recorded != now => ProcessStatus::Reused,
            _ => ProcessStatus::Running,
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal(pid: u32, sig: Signal) {
    let sig = match sig {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    unsafe {
        // Launched as group leader, so signal the whole group first.
        if libc::kill(-(pid as i32), sig) != 0 {
            libc::kill(pid as i32, sig);
        }
    }
}

#[cfg(not(unix))]
fn signal(_pid: u32, _sig: Signal) {}

/// Kernel start time (clock ticks since boot) of `pid`.
fn start_time(pid: u32) -> Option<u64> {
    probe_pid(pid).flatten()
}

/// `None` when no live process has `pid`; otherwise its start time if the
/// platform exposes one.
#[cfg(target_os = "linux")]
fn probe_pid(pid: u32) -> Option<Option<u64>> {
    let stat = read_proc_stat(pid)?;
    if stat.is_dead() {
        return None;
    }
    Some(Some(stat.start_time))
}

/// Whether any live process still belongs to process group `pgid`.
///
/// Daemons that fork workers and exit leave the group behind without its
/// leader; those workers still belong to the recorded generation.
#[cfg(target_os = "linux")]
fn group_alive(pgid: u32) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(read_proc_stat)
        .any(|stat| stat.pgrp == pgid && !stat.is_dead())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn group_alive(pgid: u32) -> bool {
    unsafe { libc::kill(-(pgid as i32), 0) == 0 }
}

#[cfg(not(unix))]
fn group_alive(_pgid: u32) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn read_proc_stat(pid: u32) -> Option<ProcStat> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_proc_stat(&stat)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn probe_pid(pid: u32) -> Option<Option<u64>> {
    let alive = unsafe { libc::kill(pid as i32, 0) == 0 };
    alive.then_some(None)
}

#[cfg(not(unix))]
fn probe_pid(_pid: u32) -> Option<Option<u64>> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    state: char,
    pgrp: u32,
    start_time: u64,
}

impl ProcStat {
    /// Zombies have exited; they only wait to be reaped.
    fn is_dead(&self) -> bool {
        self.state == 'Z' || self.state == 'X'
    }
}

/// Fields of interest from the contents of `/proc/<pid>/stat`.
///
/// The command name is parenthesised and may contain spaces, so fields are
/// counted from the last `)`. State is field 3, process group field 5 and
/// start time field 22.
fn parse_proc_stat(stat: &str) -> Option<ProcStat> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    Some(ProcStat {
        state: fields.first()?.chars().next()?,
        pgrp: fields.get(2)?.parse().ok()?,
        start_time: fields.get(19)?.parse().ok()?,
    })
}
