//! Cluster supervisor handle
//!
//! A cluster owns the spawn parameters of one worker and the handle of its
//! current process. The process handle is replaced on every start; the name
//! and shard ids never change.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use libfleet_core::{format_shard_ids, RestartDecision, RestartPolicy, RestartTracker};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LauncherError;
use crate::readiness::ReadinessWait;

/// Program and leading arguments used to start a worker
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// Signal used to stop a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
    Kill,
}

/// Result of [`Cluster::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live process already exists and the start was not forced
    AlreadyRunning,
    /// The worker signalled readiness
    Ready,
    /// The readiness pipe closed before the worker signalled
    NotReady,
    /// The worker neither signalled nor died within the readiness timeout
    TimedOut,
}

/// Readiness of a spawned process that has not been decided yet
struct PendingReady {
    wait: ReadinessWait,
    deadline: Instant,
}

/// Supervisor handle for one worker process
pub struct Cluster {
    name: String,
    shard_ids: Vec<u32>,
    total_shards: u32,
    command: WorkerCommand,
    ready_timeout: Duration,
    child: Option<Child>,
    pid: Option<u32>,
    exit_reported: bool,
    last_exit_code: Option<i32>,
    ready: bool,
    started_at: Option<DateTime<Utc>>,
    starts: u64,
    stop_signals: u64,
    restart: RestartTracker,
    restart_due: Option<Instant>,
    pending: Option<PendingReady>,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        shard_ids: Vec<u32>,
        total_shards: u32,
        command: WorkerCommand,
        ready_timeout: Duration,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            shard_ids,
            total_shards,
            command,
            ready_timeout,
            child: None,
            pid: None,
            exit_reported: false,
            last_exit_code: None,
            ready: false,
            started_at: None,
            starts: 0,
            stop_signals: 0,
            restart: RestartTracker::new(policy),
            restart_due: None,
            pending: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shard_ids(&self) -> &[u32] {
        &self.shard_ids
    }

    pub fn total_shards(&self) -> u32 {
        self.total_shards
    }

    /// Pid of the current process, if one was spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    /// Whether the current process signalled readiness
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Processes spawned over this cluster's lifetime
    pub fn starts(&self) -> u64 {
        self.starts
    }

    /// Stop signals sent over this cluster's lifetime
    pub fn stop_signals(&self) -> u64 {
        self.stop_signals
    }

    pub fn restarts(&self) -> u64 {
        self.restart.total_restarts()
    }

    pub fn is_crash_looping(&self) -> bool {
        self.restart.is_crash_looping()
    }

    /// Crashes since the last ready start
    pub fn consecutive_crashes(&self) -> u32 {
        self.restart.consecutive_crashes()
    }

    /// Whether the current process was spawned and its readiness is undecided
    pub fn is_starting(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the current process is running
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Spawn the worker and wait for its readiness signal.
    ///
    /// Without `force` this is a no-op while a live process exists. With
    /// `force` a live process is stopped first, so two processes never own
    /// the same shards.
    pub async fn start(&mut self, force: bool) -> Result<StartOutcome, LauncherError> {
        if !self.launch(force).await? {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let outcome = match self.pending.take() {
            Some(pending) => {
                let ready = tokio::time::timeout_at(pending.deadline, pending.wait.wait())
                    .await
                    .ok();
                self.settle(ready)
            }
            None => StartOutcome::AlreadyRunning,
        };
        Ok(outcome)
    }

    /// Spawn the worker without waiting for readiness.
    ///
    /// Returns `false` when a live process exists and `force` is not set.
    /// The readiness outcome is picked up later by [`Cluster::poll_readiness`].
    pub async fn launch(&mut self, force: bool) -> Result<bool, LauncherError> {
        if self.is_alive() {
            if !force {
                debug!(cluster = %self.name, "Start skipped, already running");
                return Ok(false);
            }
            self.terminate(Duration::from_secs(5)).await;
        }

        let wait = self.spawn()?;
        self.pending = Some(PendingReady {
            wait,
            deadline: Instant::now() + self.ready_timeout,
        });
        Ok(true)
    }

    /// Decide a pending readiness without blocking.
    ///
    /// Returns `None` while nothing is pending or the worker is still within
    /// its readiness timeout.
    pub fn poll_readiness(&mut self) -> Option<StartOutcome> {
        let pending = self.pending.as_mut()?;
        let ready = match pending.wait.try_resolve() {
            Some(ready) => Some(ready),
            None if Instant::now() >= pending.deadline => None,
            None => return None,
        };
        self.pending = None;
        Some(self.settle(ready))
    }

    /// `None` means the readiness timeout elapsed
    fn settle(&mut self, ready: Option<bool>) -> StartOutcome {
        match ready {
            Some(true) => {
                self.ready = true;
                self.restart.reset();
                info!(cluster = %self.name, pid = ?self.pid, "Cluster ready");
                StartOutcome::Ready
            }
            Some(false) => {
                warn!(cluster = %self.name, pid = ?self.pid, "Cluster failed to become ready");
                StartOutcome::NotReady
            }
            None => {
                // Left running; the monitor treats it like any other process
                warn!(
                    cluster = %self.name,
                    timeout_secs = self.ready_timeout.as_secs(),
                    "Cluster readiness timed out"
                );
                StartOutcome::TimedOut
            }
        }
    }

    /// Spawn a fresh process with a fresh readiness pipe
    fn spawn(&mut self) -> Result<ReadinessWait, LauncherError> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg("--cluster-name")
            .arg(&self.name)
            .arg("--shard-ids")
            .arg(format_shard_ids(&self.shard_ids))
            .arg("--shard-count")
            .arg(self.total_shards.to_string())
            .envs(self.command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| LauncherError::SpawnFailed {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| LauncherError::SpawnFailed {
            name: self.name.clone(),
            reason: "worker stdout not captured".to_string(),
        })?;

        self.pid = child.id();
        self.child = Some(child);
        self.exit_reported = false;
        self.last_exit_code = None;
        self.ready = false;
        self.restart_due = None;
        self.started_at = Some(Utc::now());
        self.starts += 1;

        info!(
            cluster = %self.name,
            pid = ?self.pid,
            shards = %format_shard_ids(&self.shard_ids),
            total = self.total_shards,
            "Spawned worker"
        );

        Ok(ReadinessWait::watch(&self.name, stdout))
    }

    /// Report the exit of the current process, once.
    ///
    /// Returns the exit code the first time the process is seen dead and
    /// `None` otherwise. A process killed by a signal reports `128 + signal`.
    pub fn poll_exit(&mut self) -> Option<i32> {
        if self.exit_reported {
            return None;
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = exit_code(status);
                self.exit_reported = true;
                self.last_exit_code = Some(code);
                self.ready = false;
                self.pending = None;
                Some(code)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(cluster = %self.name, "Failed to poll worker: {}", e);
                None
            }
        }
    }

    /// Record a crash and decide when to restart
    pub fn record_crash(&mut self) -> RestartDecision {
        let decision = self.restart.record_crash();
        if let RestartDecision::After(delay) = decision {
            self.restart_due = Some(Instant::now() + delay);
        }
        decision
    }

    /// Deferred restart deadline, if the cluster is backing off
    pub fn restart_due(&self) -> Option<Instant> {
        self.restart_due
    }

    /// Restart on the first monitor pass at or after `at`
    pub fn schedule_restart(&mut self, at: Instant) {
        self.restart_due = Some(at);
    }

    /// Send `signal` to the current process.
    ///
    /// A process that is already gone counts as stopped.
    pub fn stop(&mut self, signal: StopSignal) -> Result<(), LauncherError> {
        if !self.is_alive() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        self.stop_signals += 1;
        debug!(cluster = %self.name, pid, signal = ?signal, "Stopping worker");

        #[cfg(unix)]
        {
            send_signal(pid, signal).map_err(|e| LauncherError::SignalFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })
        }

        #[cfg(not(unix))]
        {
            let _ = (pid, signal);
            match self.child.as_mut() {
                Some(child) => child.start_kill().map_err(|e| LauncherError::SignalFailed {
                    name: self.name.clone(),
                    reason: e.to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    /// Wait up to `grace` for the current process to exit, then kill it
    pub async fn wait_or_kill(&mut self, grace: Duration) -> Option<i32> {
        let child = self.child.as_mut()?;

        let status = match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!(cluster = %self.name, "Failed to wait for worker: {}", e);
                None
            }
            Err(_) => {
                warn!(cluster = %self.name, "Worker ignored stop signal, killing");
                if let Err(e) = child.kill().await {
                    warn!(cluster = %self.name, "Failed to kill worker: {}", e);
                }
                child.try_wait().ok().flatten()
            }
        };

        let code = status.map(exit_code);
        if code.is_some() {
            self.last_exit_code = code;
            self.exit_reported = true;
            self.ready = false;
        }
        code
    }

    /// Interrupt the current process and reap it
    async fn terminate(&mut self, grace: Duration) {
        if let Err(e) = self.stop(StopSignal::Interrupt) {
            warn!(cluster = %self.name, "{}", e);
        }
        self.wait_or_kill(grace).await;
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: StopSignal) -> std::io::Result<()> {
    let sig = match signal {
        StopSignal::Interrupt => libc::SIGINT,
        StopSignal::Terminate => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };

    let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone
        return Ok(());
    }
    Err(err)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh").arg("-c").arg(script).arg("worker")
    }

    fn cluster(script: &str) -> Cluster {
        Cluster::new(
            "Beta",
            vec![3, 4, 5],
            7,
            sh(script),
            Duration::from_secs(5),
            RestartPolicy::immediate(),
        )
    }

    #[tokio::test]
    async fn test_start_waits_for_ready() {
        let mut c = cluster("printf 1; exec sleep 30");
        assert_eq!(c.start(false).await.unwrap(), StartOutcome::Ready);
        assert!(c.is_ready());
        assert!(c.is_alive());
        assert!(c.pid().is_some());

        c.stop(StopSignal::Interrupt).unwrap();
        assert_eq!(c.wait_or_kill(Duration::from_secs(5)).await, Some(128 + libc::SIGINT));
    }

    #[tokio::test]
    async fn test_worker_gets_env_and_terminate() {
        let command = sh(r#"[ "$FLEET_MARK" = beta ] && printf 1; exec sleep 30"#).env("FLEET_MARK", "beta");
        let mut c = Cluster::new("Beta", vec![3], 4, command, Duration::from_secs(5), RestartPolicy::immediate());
        assert_eq!(c.start(false).await.unwrap(), StartOutcome::Ready);

        c.stop(StopSignal::Terminate).unwrap();
        assert_eq!(c.wait_or_kill(Duration::from_secs(5)).await, Some(128 + libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_start_is_noop_while_alive() {
        let mut c = cluster("printf 1; exec sleep 30");
        c.start(false).await.unwrap();
        let pid = c.pid();

        assert_eq!(c.start(false).await.unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(c.pid(), pid);
        assert_eq!(c.starts(), 1);

        c.stop(StopSignal::Kill).unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_forced_start_replaces_process() {
        let mut c = cluster("printf 1; exec sleep 30");
        c.start(false).await.unwrap();
        let first = c.pid();

        assert_eq!(c.start(true).await.unwrap(), StartOutcome::Ready);
        assert_ne!(c.pid(), first);
        assert_eq!(c.starts(), 2);
        assert_eq!(c.shard_ids(), &[3, 4, 5]);

        c.stop(StopSignal::Kill).unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_death_before_ready() {
        let mut c = cluster("exit 3");
        assert_eq!(c.start(false).await.unwrap(), StartOutcome::NotReady);
        c.wait_or_kill(Duration::from_secs(5)).await;
        assert_eq!(c.last_exit_code(), Some(3));
        assert!(!c.is_alive());
    }

    #[tokio::test]
    async fn test_readiness_timeout() {
        let mut c = Cluster::new(
            "Gamma",
            vec![0],
            1,
            sh("exec sleep 30"),
            Duration::from_millis(200),
            RestartPolicy::immediate(),
        );
        assert_eq!(c.start(false).await.unwrap(), StartOutcome::TimedOut);
        assert!(c.is_alive());
        c.stop(StopSignal::Kill).unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_launch_resolves_readiness_through_polling() {
        let mut c = cluster("sleep 0.2; printf 1; exec sleep 30");
        assert!(c.launch(false).await.unwrap());
        assert!(c.is_starting());
        assert_eq!(c.poll_readiness(), None);
        assert!(!c.is_ready());

        let mut outcome = None;
        for _ in 0..100 {
            outcome = c.poll_readiness();
            if outcome.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(outcome, Some(StartOutcome::Ready));
        assert!(c.is_ready());
        assert!(!c.is_starting());
        assert_eq!(c.poll_readiness(), None);

        c.stop(StopSignal::Kill).unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_polled_readiness_times_out() {
        let mut c = Cluster::new(
            "Delta",
            vec![0],
            1,
            sh("exec sleep 30"),
            Duration::from_millis(200),
            RestartPolicy::immediate(),
        );
        assert!(c.launch(false).await.unwrap());
        assert_eq!(c.poll_readiness(), None);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(c.poll_readiness(), Some(StartOutcome::TimedOut));
        assert!(!c.is_starting());
        assert!(c.is_alive());

        c.stop(StopSignal::Kill).unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_poll_exit_reports_once() {
        let mut c = cluster("printf 1; exit 1");
        c.start(false).await.unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;

        // wait_or_kill already observed this exit
        assert_eq!(c.poll_exit(), None);
        assert_eq!(c.last_exit_code(), Some(1));
    }

    #[tokio::test]
    async fn test_stop_gone_process_is_ok() {
        let mut c = cluster("printf 1; exit 0");
        c.start(false).await.unwrap();
        c.wait_or_kill(Duration::from_secs(5)).await;

        assert!(c.stop(StopSignal::Interrupt).is_ok());
        assert_eq!(c.stop_signals(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_process_is_ok() {
        let mut c = cluster("exit 0");
        assert!(c.stop(StopSignal::Interrupt).is_ok());
        assert_eq!(c.poll_exit(), None);
    }

    #[test]
    fn test_signal_missing_pid_is_ok() {
        // Above any pid the kernel hands out
        assert!(send_signal(i32::MAX as u32, StopSignal::Interrupt).is_ok());
    }
}
