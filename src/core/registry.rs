//! Profile registry - Validated load/add/remove over the profile store

use std::path::Path;

use tracing::{error, info, warn};

use super::error::{Error, Result};
use super::profile::{Profile, DEFAULT_PROFILE_NAME};
use crate::persistence::ProfileStore;
use crate::platform::Platform;

/// Owns the list of configured profiles. Knows nothing about processes.
pub struct ProfileRegistry {
    store: ProfileStore,
    platform: Platform,
}

impl ProfileRegistry {
    pub fn new(store: ProfileStore, platform: Platform) -> Self {
        Self { store, platform }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Load profiles: the default profile first, then every valid stored entry.
    ///
    /// Invalid or duplicate entries are dropped with a warning. A store that
    /// cannot be read yields only the default profile.
    pub fn load(&self) -> Vec<Profile> {
        let mut profiles = vec![Profile::default_profile()];

        let stored = match self.store.read() {
            Ok(Some(stored)) => stored,
            Ok(None) => return profiles,
            Err(e) => {
                error!("Failed to load profiles: {}", e);
                return profiles;
            }
        };

        for mut profile in stored {
            if let Err(reason) = self.check_entry(&profile) {
                warn!("Ignoring stored profile '{}': {}", profile.name, reason);
                continue;
            }
            if let Some(existing) = self.find_collision(&profiles, &profile.name, &profile.isolation_dir)
            {
                warn!(
                    "Ignoring stored profile '{}': duplicates profile '{}'",
                    profile.name, existing.name
                );
                continue;
            }
            profile.is_default = false;
            profiles.push(profile);
        }

        info!("Loaded {} profile(s)", profiles.len());
        profiles
    }

    /// Append a new profile and persist the full set
    pub fn add(&self, name: &str, dir: &str, current: &[Profile]) -> Result<Vec<Profile>> {
        if name == DEFAULT_PROFILE_NAME {
            return Err(Error::Validation(format!(
                "the name '{}' is reserved for the default profile",
                DEFAULT_PROFILE_NAME
            )));
        }
        if name.trim().is_empty() {
            return Err(Error::Validation("profile name cannot be empty".into()));
        }
        if dir.trim().is_empty() {
            return Err(Error::Validation(
                "the profile directory cannot be empty".into(),
            ));
        }
        if self.is_os_default_dir(dir) {
            return Err(Error::Validation(format!(
                "the directory '{}' is the browser's own default profile",
                dir
            )));
        }
        if let Some(existing) = self.find_collision(current, name, dir) {
            return Err(Error::Validation(if existing.name == name {
                format!("a profile named '{}' already exists", name)
            } else {
                format!(
                    "the directory '{}' is already used by profile '{}'",
                    dir, existing.name
                )
            }));
        }

        let mut updated = current.to_vec();
        updated.push(Profile::new(name, dir));
        self.persist(&updated)?;

        info!("Added profile '{}' ({})", name, dir);
        Ok(updated)
    }

    /// Remove a profile by name and persist the remaining set
    pub fn remove(&self, name: &str, current: &[Profile]) -> Result<Vec<Profile>> {
        if name == DEFAULT_PROFILE_NAME {
            return Err(Error::ProtectedEntity(name.to_string()));
        }
        if !current.iter().any(|p| p.name == name) {
            return Err(Error::NotFound(name.to_string()));
        }

        let updated: Vec<Profile> = current.iter().filter(|p| p.name != name).cloned().collect();
        self.persist(&updated)?;

        info!("Removed profile '{}'", name);
        Ok(updated)
    }

    /// Rewrite the store with every non-default profile
    pub fn persist(&self, profiles: &[Profile]) -> Result<()> {
        for profile in profiles.iter().filter(|p| !p.is_default) {
            self.check_entry(profile)
                .map_err(|reason| Error::Validation(format!("'{}': {}", profile.name, reason)))?;
        }
        self.store.write(profiles)
    }

    /// Problems that make a non-default entry unusable
    fn check_entry(&self, profile: &Profile) -> std::result::Result<(), String> {
        if profile.name == DEFAULT_PROFILE_NAME {
            return Err("name is reserved for the default profile".into());
        }
        if profile.name.trim().is_empty() {
            return Err("name is empty".into());
        }
        if profile.isolation_dir.trim().is_empty() {
            return Err("directory is empty".into());
        }
        if self.is_os_default_dir(&profile.isolation_dir) {
            return Err(format!(
                "directory '{}' is the browser's own default profile",
                profile.isolation_dir
            ));
        }
        Ok(())
    }

    fn is_os_default_dir(&self, dir: &str) -> bool {
        self.platform
            .default_profile_dir()
            .is_some_and(|default| self.platform.same_dir(Path::new(dir), &default))
    }

    /// First non-default profile sharing `name` or the directory `dir`
    fn find_collision<'a>(&self, profiles: &'a [Profile], name: &str, dir: &str) -> Option<&'a Profile> {
        profiles.iter().filter(|p| !p.is_default).find(|p| {
            p.name == name
                || self
                    .platform
                    .same_dir(Path::new(&p.isolation_dir), Path::new(dir))
        })
    }
}
