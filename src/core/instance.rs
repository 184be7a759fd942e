//! Instance management - Lifecycle of the browser running one profile

use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{Error, Result};
use super::matcher::ProcessMatcher;
use super::process::{spawn_detached, LaunchCommand};
use super::profile::Profile;
use crate::platform::{self, Termination};

/// How a launched process ended
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    /// The OS reported an exit status
    Exited(ExitStatus),
    /// Waiting on the process failed, so its status is unknown
    Unknown(String),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Exited(status) => status.to_string(),
            Self::Unknown(reason) => format!("unknown ({})", reason),
        }
    }
}

/// Externally visible status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// No process is known for this profile
    Stopped,
    /// Launched by this supervisor; the process handle is held
    Running,
    /// Found in the process table; no handle is held
    RunningExternal,
}

impl InstanceStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Stopped)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
            Self::RunningExternal => "Running (external)",
        }
    }
}

/// Handle to a process this instance launched itself
#[derive(Debug)]
struct OwnedProcess {
    pid: u32,
    started_at: DateTime<Utc>,
    /// Set once the reaper task has observed the exit
    exit: watch::Receiver<Option<ExitOutcome>>,
}

impl OwnedProcess {
    fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Send the graceful termination signal; `Err` means it could not be delivered
    fn signal(&self) -> std::result::Result<(), String> {
        if self.has_exited() {
            return Err("process has already exited".into());
        }
        match platform::terminate_process(self.pid) {
            Ok(Termination::Requested) => Ok(()),
            Ok(Termination::AlreadyExited) => Err("process has already exited".into()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[derive(Debug)]
enum Liveness {
    Owned(OwnedProcess),
    ExternallyObserved,
}

#[derive(Debug)]
enum RunState {
    Stopped,
    Running(Liveness),
}

/// Point-in-time view of an instance for presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub name: String,
    pub directory: String,
    pub is_default: bool,
    pub status: InstanceStatus,
    pub pid: Option<u32>,
    /// Known only for processes launched by this supervisor
    pub started_at: Option<DateTime<Utc>>,
}

impl InstanceSnapshot {
    /// Format uptime as human-readable string
    pub fn uptime_string(&self) -> String {
        match self.started_at {
            Some(started) => {
                let secs = (Utc::now() - started).num_seconds().max(0);
                if secs < 60 {
                    format!("{}s", secs)
                } else if secs < 3600 {
                    format!("{}m {}s", secs / 60, secs % 60)
                } else if secs < 86400 {
                    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
                } else {
                    format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
                }
            }
            None => "-".to_string(),
        }
    }
}

/// Supervises the browser process for one profile.
///
/// The run state (owned handle and running flag) is guarded by a single
/// lock per instance; instances never share locks.
pub struct Instance {
    profile: Profile,
    launch: LaunchCommand,
    matcher: Arc<dyn ProcessMatcher>,
    state: Mutex<RunState>,
}

impl Instance {
    /// Create the instance, marking it running if a matching process already exists
    pub fn new(profile: Profile, launch: LaunchCommand, matcher: Arc<dyn ProcessMatcher>) -> Self {
        let detected = !matcher.find(profile.isolation_dir()).is_empty();
        let state = if detected {
            info!("Instance '{}' is already running", profile.name);
            RunState::Running(Liveness::ExternallyObserved)
        } else {
            RunState::Stopped
        };

        Self {
            profile,
            launch,
            matcher,
            state: Mutex::new(state),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn launch_command(&self) -> &LaunchCommand {
        &self.launch
    }

    // Every transition below leaves the state valid, so a poisoned lock is still usable
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch the browser for this profile and return its PID.
    ///
    /// Must be called from within a Tokio runtime; the exit of the process is
    /// observed by a task on that runtime.
    pub fn start(&self) -> Result<u32> {
        let mut state = self.lock_state();
        if let RunState::Running(_) = *state {
            return Err(Error::AlreadyRunning(self.name().to_string()));
        }

        let launch_error = |source| Error::Launch {
            name: self.name().to_string(),
            source,
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| launch_error(std::io::Error::other(e)))?;

        let mut child = spawn_detached(&self.launch).map_err(launch_error)?;
        let pid = child.id().ok_or_else(|| {
            launch_error(std::io::Error::other("process exited before reporting a PID"))
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        runtime.spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::Exited(status),
                Err(e) => ExitOutcome::Unknown(e.to_string()),
            };
            debug!("PID {} exited: {}", pid, outcome.describe());
            exit_tx.send_replace(Some(outcome));
        });

        *state = RunState::Running(Liveness::Owned(OwnedProcess {
            pid,
            started_at: Utc::now(),
            exit: exit_rx,
        }));
        info!("Started instance '{}' (PID {})", self.name(), pid);
        Ok(pid)
    }

    /// Ask the running browser to terminate.
    ///
    /// Returns as soon as a termination request was accepted; does not wait
    /// for the process to exit. On failure the instance stays running.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock_state();
        let liveness = match &*state {
            RunState::Stopped => return Err(Error::NotRunning(self.name().to_string())),
            RunState::Running(liveness) => liveness,
        };

        match liveness {
            Liveness::Owned(owned) => {
                if let Err(reason) = owned.signal() {
                    warn!(
                        "Could not signal PID {} of '{}' ({}); searching process table",
                        owned.pid,
                        self.name(),
                        reason
                    );
                    self.stop_by_discovery().map_err(|fallback| Error::Stop {
                        name: self.name().to_string(),
                        reason: format!("signal failed: {}; {}", reason, fallback),
                    })?;
                }
            }
            Liveness::ExternallyObserved => {
                self.stop_by_discovery().map_err(|reason| Error::Stop {
                    name: self.name().to_string(),
                    reason,
                })?;
            }
        }

        *state = RunState::Stopped;
        info!("Stopped instance '{}'", self.name());
        Ok(())
    }

    /// Find this profile's processes and terminate them all.
    /// Succeeds if at least one termination was requested or found unnecessary.
    fn stop_by_discovery(&self) -> std::result::Result<(), String> {
        let pids = self.matcher.find(self.profile.isolation_dir());
        if pids.is_empty() {
            return Err("no matching process found".into());
        }

        let mut stopped = 0usize;
        let mut last_error = None;
        for pid in pids {
            match self.matcher.kill(pid) {
                Ok(_) => stopped += 1,
                Err(e) => {
                    warn!("Failed to terminate PID {}: {}", pid, e);
                    last_error = Some(format!("PID {}: {}", pid, e));
                }
            }
        }

        match (stopped, last_error) {
            (0, Some(e)) => Err(format!("termination failed for every matching process ({})", e)),
            _ => Ok(()),
        }
    }

    /// Whether the instance is running. Never scans the process table; an
    /// owned process that has exited is noticed here and the handle dropped.
    pub fn is_running(&self) -> bool {
        let mut state = self.lock_state();
        if let RunState::Running(Liveness::Owned(owned)) = &*state {
            if owned.has_exited() {
                info!("Instance '{}' (PID {}) has exited", self.name(), owned.pid);
                *state = RunState::Stopped;
            }
        }
        matches!(*state, RunState::Running(_))
    }

    /// Wait for the owned process to exit and mark the instance stopped.
    ///
    /// Returns `None` immediately when no handle is held. Intended to run on
    /// its own task right after [`Instance::start`].
    pub async fn wait(&self) -> Option<ExitOutcome> {
        let (pid, mut exit) = {
            let state = self.lock_state();
            match &*state {
                RunState::Running(Liveness::Owned(owned)) => (owned.pid, owned.exit.clone()),
                _ => return None,
            }
        };

        let outcome = match exit.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => Some(ExitOutcome::Unknown("exit watcher dropped".into())),
        };

        let mut state = self.lock_state();
        // A stop followed by a new start may have replaced the handle meanwhile
        if matches!(&*state, RunState::Running(Liveness::Owned(owned)) if owned.pid == pid) {
            *state = RunState::Stopped;
            info!("Instance '{}' (PID {}) has exited", self.name(), pid);
        }
        outcome
    }

    /// Re-scan the process table for an instance that holds no handle.
    /// An owned handle is never overridden by a scan.
    pub fn refresh(&self) -> bool {
        if matches!(*self.lock_state(), RunState::Running(Liveness::Owned(_))) {
            return self.is_running();
        }

        let detected = !self.matcher.find(self.profile.isolation_dir()).is_empty();

        let mut state = self.lock_state();
        if !matches!(*state, RunState::Running(Liveness::Owned(_))) {
            *state = if detected {
                RunState::Running(Liveness::ExternallyObserved)
            } else {
                RunState::Stopped
            };
        }
        drop(state);
        self.is_running()
    }

    pub fn status(&self) -> InstanceStatus {
        self.is_running();
        match &*self.lock_state() {
            RunState::Stopped => InstanceStatus::Stopped,
            RunState::Running(Liveness::Owned(_)) => InstanceStatus::Running,
            RunState::Running(Liveness::ExternallyObserved) => InstanceStatus::RunningExternal,
        }
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        self.is_running();
        let state = self.lock_state();
        let (status, pid, started_at) = match &*state {
            RunState::Stopped => (InstanceStatus::Stopped, None, None),
            RunState::Running(Liveness::Owned(owned)) => {
                (InstanceStatus::Running, Some(owned.pid), Some(owned.started_at))
            }
            RunState::Running(Liveness::ExternallyObserved) => {
                (InstanceStatus::RunningExternal, None, None)
            }
        };

        InstanceSnapshot {
            name: self.profile.name.clone(),
            directory: self.profile.display_dir().to_string(),
            is_default: self.profile.is_default,
            status,
            pid,
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::core::matcher::fake::FakeMatcher;

    fn idle_command() -> LaunchCommand {
        LaunchCommand {
            program: PathBuf::from("/nonexistent/browser"),
            args: Vec::new(),
        }
    }

    fn instance(profile: Profile, matcher: &Arc<FakeMatcher>) -> Instance {
        Instance::new(profile, idle_command(), Arc::clone(matcher) as Arc<dyn ProcessMatcher>)
    }

    #[test]
    fn construction_queries_matcher_once() {
        let matcher = Arc::new(FakeMatcher::default());
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        assert!(!instance.is_running());
        assert_eq!(instance.status(), InstanceStatus::Stopped);
        assert_eq!(
            *matcher.find_calls.lock().unwrap(),
            vec![Some(PathBuf::from("/data/work"))]
        );
    }

    #[test]
    fn stop_when_stopped_makes_no_os_calls() {
        let matcher = Arc::new(FakeMatcher::default());
        let instance = instance(Profile::new("work", "/data/work"), &matcher);
        let finds_before = matcher.find_count();

        assert!(matches!(instance.stop(), Err(Error::NotRunning(_))));
        assert_eq!(matcher.find_count(), finds_before);
        assert!(matcher.kills().is_empty());
    }

    #[test]
    fn default_instance_detected_and_stopped_by_discovery() {
        let matcher = Arc::new(
            FakeMatcher::default()
                .then_find(vec![4242])
                .then_find(vec![4242])
                .then_kill(Ok(Termination::AlreadyExited)),
        );
        let instance = instance(Profile::default_profile(), &matcher);

        assert!(instance.is_running());
        assert_eq!(instance.status(), InstanceStatus::RunningExternal);
        assert_eq!(instance.snapshot().pid, None);

        instance.stop().unwrap();
        assert!(!instance.is_running());
        assert_eq!(matcher.kills(), vec![4242]);
        assert_eq!(*matcher.find_calls.lock().unwrap(), vec![None, None]);

        // Nothing is left: a later scan finds nothing and reports stopped
        assert!(!instance.refresh());
    }

    #[test]
    fn failed_discovery_keeps_instance_running() {
        let matcher = Arc::new(FakeMatcher::default().then_find(vec![7]));
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        let err = instance.stop().unwrap_err();
        assert!(matches!(err, Error::Stop { .. }));
        assert!(instance.is_running());
        assert!(matcher.kills().is_empty());
    }

    #[test]
    fn failed_kills_keep_instance_running() {
        let matcher = Arc::new(
            FakeMatcher::default()
                .then_find(vec![7])
                .then_find(vec![7, 8])
                .then_kill(Err(io::Error::from(io::ErrorKind::PermissionDenied)))
                .then_kill(Err(io::Error::from(io::ErrorKind::PermissionDenied))),
        );
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        assert!(matches!(instance.stop(), Err(Error::Stop { .. })));
        assert!(instance.is_running());
        assert_eq!(matcher.kills(), vec![7, 8]);
    }

    #[test]
    fn one_successful_kill_is_enough() {
        let matcher = Arc::new(
            FakeMatcher::default()
                .then_find(vec![7])
                .then_find(vec![7, 8])
                .then_kill(Err(io::Error::from(io::ErrorKind::PermissionDenied))),
        );
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        instance.stop().unwrap();
        assert!(!instance.is_running());
    }

    #[test]
    fn refresh_picks_up_external_start() {
        let matcher = Arc::new(FakeMatcher::default().then_find(vec![]).then_find(vec![99]));
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        assert!(!instance.is_running());
        assert!(instance.refresh());
        assert_eq!(instance.status(), InstanceStatus::RunningExternal);
    }

    #[test]
    fn uptime_only_for_owned_processes() {
        let matcher = Arc::new(FakeMatcher::default().then_find(vec![5]));
        let external = instance(Profile::new("work", "/data/work"), &matcher).snapshot();
        assert_eq!(external.status, InstanceStatus::RunningExternal);
        assert_eq!(external.uptime_string(), "-");

        let owned = InstanceSnapshot {
            started_at: Some(Utc::now() - chrono::Duration::seconds(3725)),
            status: InstanceStatus::Running,
            pid: Some(5),
            ..external
        };
        assert_eq!(owned.uptime_string(), "1h 2m");
    }

    #[tokio::test]
    async fn wait_without_handle_returns_immediately() {
        let matcher = Arc::new(FakeMatcher::default().then_find(vec![5]));
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        assert!(instance.wait().await.is_none());
        // An externally observed instance is not touched by wait
        assert!(instance.is_running());
    }

    #[tokio::test]
    async fn launch_failure_leaves_instance_stopped() {
        let matcher = Arc::new(FakeMatcher::default());
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        let err = instance.start().unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert!(!instance.is_running());
    }

    #[test]
    fn start_outside_runtime_is_a_launch_error() {
        let matcher = Arc::new(FakeMatcher::default());
        let instance = instance(Profile::new("work", "/data/work"), &matcher);

        assert!(matches!(instance.start(), Err(Error::Launch { .. })));
        assert!(!instance.is_running());
    }

    #[cfg(unix)]
    mod live {
        use super::*;
        use crate::core::process::{build_launch_command, LaunchTarget};
        use crate::platform::{OsFamily, Platform};

        fn shell_instance(script: &str, matcher: &Arc<FakeMatcher>) -> Arc<Instance> {
            let dir = tempfile::tempdir().unwrap();
            let platform = Platform::with_home(OsFamily::current(), dir.path());
            let target = LaunchTarget::custom("/bin/sh")
                .with_leading_args(vec!["-c".into(), script.into()]);
            let profile = Profile::new("live", dir.path().join("profile").to_string_lossy());
            let launch = build_launch_command(&platform, &target, &profile);
            Arc::new(Instance::new(
                profile,
                launch,
                Arc::clone(matcher) as Arc<dyn ProcessMatcher>,
            ))
        }

        #[tokio::test]
        async fn start_stop_cycle() {
            let matcher = Arc::new(FakeMatcher::default());
            let instance = shell_instance("exec sleep 30", &matcher);

            let pid = instance.start().unwrap();
            assert!(instance.is_running());
            assert_eq!(instance.status(), InstanceStatus::Running);
            assert_eq!(instance.snapshot().pid, Some(pid));

            assert!(matches!(instance.start(), Err(Error::AlreadyRunning(_))));
            assert_eq!(instance.snapshot().pid, Some(pid));

            instance.stop().unwrap();
            assert!(!instance.is_running());
            assert!(matcher.kills().is_empty());
            // The handle is gone, so there is nothing left to wait for
            assert!(instance.wait().await.is_none());

            let mut gone = false;
            for _ in 0..400 {
                if platform::terminate_process(pid).unwrap() == Termination::AlreadyExited {
                    gone = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            assert!(gone, "PID {} survived SIGTERM", pid);
        }

        #[tokio::test]
        async fn external_kill_is_noticed_by_wait() {
            let matcher = Arc::new(FakeMatcher::default());
            let instance = shell_instance("exec sleep 30", &matcher);
            let pid = instance.start().unwrap();

            let waiter = tokio::spawn({
                let instance = Arc::clone(&instance);
                async move { instance.wait().await }
            });

            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }

            let outcome = tokio::time::timeout(Duration::from_secs(10), waiter)
                .await
                .expect("waiter finished")
                .unwrap()
                .expect("exit outcome");
            assert!(!outcome.success());
            assert!(!instance.is_running());
            assert!(matcher.kills().is_empty());
        }

        #[tokio::test]
        async fn is_running_heals_after_exit_without_wait() {
            let matcher = Arc::new(FakeMatcher::default());
            let instance = shell_instance("exit 0", &matcher);
            instance.start().unwrap();

            let mut running = true;
            for _ in 0..200 {
                running = instance.is_running();
                if !running {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            assert!(!running);
            assert!(instance.wait().await.is_none());
        }

        #[tokio::test]
        async fn stop_after_exit_falls_back_to_discovery() {
            let matcher = Arc::new(FakeMatcher::default());
            let instance = shell_instance("exec sleep 30", &matcher);
            let pid = instance.start().unwrap();

            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
            // Give the reaper a moment so the exit is already recorded
            for _ in 0..200 {
                let exited = matches!(
                    &*instance.lock_state(),
                    RunState::Running(Liveness::Owned(owned)) if owned.has_exited()
                );
                if exited {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }

            // Signal cannot be delivered and discovery finds nothing
            let err = instance.stop().unwrap_err();
            assert!(matches!(err, Error::Stop { .. }));
            assert_eq!(matcher.find_count(), 2);
        }
    }
}
