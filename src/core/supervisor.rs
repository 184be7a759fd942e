//! Instance supervisor - One instance per configured profile

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::error::{Error, Result};
use super::instance::{ExitOutcome, Instance, InstanceSnapshot};
use super::matcher::ProcessMatcher;
use super::process::{build_launch_command, LaunchTarget};
use super::profile::Profile;
use crate::platform::Platform;

/// Owns the instances built from the current profile list.
///
/// Rebuilding with [`InstanceSupervisor::materialize`] discards the previous
/// instances; a process launched by a discarded instance keeps running and
/// is found again by discovery.
pub struct InstanceSupervisor {
    platform: Platform,
    target: LaunchTarget,
    matcher: Arc<dyn ProcessMatcher>,
    instances: Vec<Arc<Instance>>,
}

impl InstanceSupervisor {
    pub fn new(platform: Platform, target: LaunchTarget, matcher: Arc<dyn ProcessMatcher>) -> Self {
        Self {
            platform,
            target,
            matcher,
            instances: Vec::new(),
        }
    }

    /// Build one instance per profile, in profile order.
    /// Each construction queries the process table once.
    pub fn materialize(&mut self, profiles: &[Profile]) {
        self.instances = profiles
            .iter()
            .map(|profile| {
                let launch = build_launch_command(&self.platform, &self.target, profile);
                let instance = Instance::new(profile.clone(), launch, Arc::clone(&self.matcher));
                info!(
                    "Startup check: '{}' ({}) running: {}",
                    profile.name,
                    profile.display_dir(),
                    instance.is_running()
                );
                Arc::new(instance)
            })
            .collect();
    }

    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Instance>> {
        self.instances
            .iter()
            .find(|instance| instance.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Start the named instance and spawn its dedicated wait task.
    ///
    /// The returned handle resolves once the launched process exits; the
    /// caller decides whether to await it or poll `is_running`.
    pub fn start(&self, name: &str) -> Result<JoinHandle<Option<ExitOutcome>>> {
        let instance = Arc::clone(self.get(name)?);
        instance.start()?;

        Ok(tokio::spawn(async move {
            let outcome = instance.wait().await;
            match &outcome {
                Some(exit) if exit.success() => {
                    info!("Instance '{}' exited normally", instance.name())
                }
                Some(exit) => warn!("Instance '{}' exited: {}", instance.name(), exit.describe()),
                None => {}
            }
            outcome
        }))
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        self.get(name)?.stop()
    }

    /// Current state of every instance, in profile order
    pub fn snapshot(&self) -> Vec<InstanceSnapshot> {
        self.instances.iter().map(|instance| instance.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::instance::InstanceStatus;
    use crate::core::matcher::fake::FakeMatcher;
    use crate::core::profile::DEFAULT_PROFILE_NAME;
    use crate::platform::OsFamily;

    fn supervisor(matcher: &Arc<FakeMatcher>, target: LaunchTarget) -> InstanceSupervisor {
        InstanceSupervisor::new(
            Platform::with_home(OsFamily::Linux, "/home/ana"),
            target,
            Arc::clone(matcher) as Arc<dyn ProcessMatcher>,
        )
    }

    fn profiles() -> Vec<Profile> {
        vec![
            Profile::default_profile(),
            Profile::new("work", "/data/work"),
            Profile::new("play", "profiles/play"),
        ]
    }

    #[test]
    fn materialize_keeps_profile_order_and_seeds_state() {
        let matcher = Arc::new(
            FakeMatcher::default()
                .then_find(vec![])
                .then_find(vec![31, 30])
                .then_find(vec![]),
        );
        let mut supervisor = supervisor(&matcher, LaunchTarget::for_platform(OsFamily::Linux));
        supervisor.materialize(&profiles());

        let rows = supervisor.snapshot();
        let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec![DEFAULT_PROFILE_NAME, "work", "play"]);
        assert_eq!(
            rows.iter().map(|row| row.status).collect::<Vec<_>>(),
            vec![
                InstanceStatus::Stopped,
                InstanceStatus::RunningExternal,
                InstanceStatus::Stopped
            ]
        );
        assert!(rows[0].is_default);
        assert_eq!(
            *matcher.find_calls.lock().unwrap(),
            vec![
                None,
                Some(PathBuf::from("/data/work")),
                Some(PathBuf::from("profiles/play"))
            ]
        );
    }

    #[test]
    fn launch_commands_use_resolved_directories() {
        let matcher = Arc::new(FakeMatcher::default());
        let mut supervisor = supervisor(&matcher, LaunchTarget::for_platform(OsFamily::Linux));
        supervisor.materialize(&profiles());

        let play = supervisor.get("play").unwrap();
        assert_eq!(
            play.launch_command().args[0],
            "--user-data-dir=/home/ana/profiles/play"
        );
        let default = supervisor.get(DEFAULT_PROFILE_NAME).unwrap();
        assert!(!default
            .launch_command()
            .args
            .iter()
            .any(|arg| arg.starts_with("--user-data-dir")));
    }

    #[test]
    fn unknown_names_are_not_found() {
        let matcher = Arc::new(FakeMatcher::default());
        let mut supervisor = supervisor(&matcher, LaunchTarget::for_platform(OsFamily::Linux));
        supervisor.materialize(&profiles());

        assert!(matches!(supervisor.get("nope"), Err(Error::NotFound(_))));
        assert!(matches!(supervisor.stop("nope"), Err(Error::NotFound(_))));
        assert!(matches!(supervisor.stop("work"), Err(Error::NotRunning(_))));
    }

    #[test]
    fn rematerialize_replaces_instances() {
        let matcher = Arc::new(FakeMatcher::default());
        let mut supervisor = supervisor(&matcher, LaunchTarget::for_platform(OsFamily::Linux));
        supervisor.materialize(&profiles());
        supervisor.materialize(&profiles()[..1]);

        assert_eq!(supervisor.instances().len(), 1);
        assert_eq!(matcher.find_count(), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_spawns_a_waiter_that_observes_exit() {
        let matcher = Arc::new(FakeMatcher::default());
        let target = LaunchTarget::custom("/bin/sh")
            .with_leading_args(vec!["-c".into(), "exit 3".into()]);
        let mut supervisor = supervisor(&matcher, target);
        supervisor.materialize(&profiles());

        let waiter = supervisor.start("work").unwrap();
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), waiter)
            .await
            .expect("waiter finished")
            .unwrap()
            .expect("exit outcome");

        assert!(!outcome.success());
        assert!(!supervisor.get("work").unwrap().is_running());
        assert_eq!(
            supervisor.snapshot()[1].status,
            InstanceStatus::Stopped
        );
    }
}
