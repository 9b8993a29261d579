//! User preference persistence with file locking.
//!
//! Preferences are read once when a cooking session starts; the session never
//! writes them back.

use crate::{Error, Result, UserPreferences};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

impl UserPreferences {
    /// Load saved preferences with shared locking
    ///
    /// Returns `None` if nothing was saved yet or the file is unreadable.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::info!("No preferences saved at {:?}", path);
            return Ok(None);
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open preferences {:?}: {}", path, e);
                return Ok(None);
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock preferences {:?}: {}", path, e);
            return Ok(None);
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read preferences {:?}: {}", path, e);
            return Ok(None);
        }

        file.unlock()?;

        match serde_json::from_str::<UserPreferences>(&contents) {
            Ok(prefs) => {
                tracing::debug!("Loaded preferences for {}", prefs.user_name);
                Ok(Some(prefs))
            }
            Err(e) => {
                tracing::warn!("Failed to parse preferences {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Save preferences atomically (temp file, fsync, rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "preferences path missing parent",
            ))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved preferences to {:?}", path);
        Ok(())
    }
}
