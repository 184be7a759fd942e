//! JSON file storage for the non-default profiles

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::{Error, Profile, Result};

/// Stores profiles as a pretty-printed JSON array of `{name, user_data_dir}` records
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored record, `None` when the file does not exist yet
    pub fn read(&self) -> Result<Option<Vec<Profile>>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        debug!("Read {} bytes from {:?}", data.len(), self.path);

        let profiles: Vec<Profile> =
            serde_json::from_slice(&data).map_err(|e| Error::io(&self.path, e))?;
        Ok(Some(profiles))
    }

    /// Replace the file with the non-default entries of `profiles`
    pub fn write(&self, profiles: &[Profile]) -> Result<()> {
        let records: Vec<&Profile> = profiles.iter().filter(|p| !p.is_default).collect();
        let json = serde_json::to_vec_pretty(&records).map_err(|e| Error::io(&self.path, e))?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&self.path, json).map_err(|e| Error::io(&self.path, e))?;

        info!("Saved {} profile(s) to {:?}", records.len(), self.path);
        Ok(())
    }
}
