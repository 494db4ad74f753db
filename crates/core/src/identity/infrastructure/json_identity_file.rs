use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::identity::domain::identity_repository::{IdentityRepository, IdentitySnapshot, StoreError};
use crate::identity::domain::identity_store::IdentityStore;
use crate::shared::config::StoreConfig;

/// Identity table persisted as one JSON document, replaced atomically.
#[derive(Clone, Debug)]
pub struct JsonIdentityFile {
    path: PathBuf,
}

impl JsonIdentityFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl IdentityRepository for JsonIdentityFile {
    fn load(&self) -> Result<Option<IdentitySnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if data.iter().all(u8::is_ascii_whitespace) {
            log::debug!("Identity store {} is empty", self.path.display());
            return Ok(None);
        }

        let snapshot: IdentitySnapshot =
            serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        snapshot.validate().map_err(|reason| StoreError::Corrupt {
            path: self.path.clone(),
            reason,
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &IdentitySnapshot) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;

        let serialized = serde_json::to_vec(snapshot)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| self.write_error(e))?;
        {
            let file = tmp.as_file_mut();
            let mut writer = BufWriter::new(&mut *file);
            writer
                .write_all(&serialized)
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush())
                .map_err(|e| self.write_error(e))?;
            drop(writer);
            file.sync_all().map_err(|e| self.write_error(e))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| self.write_error(e.error))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Loads the store at `config.path`, starting empty when absent or unreadable.
pub fn open_store(config: StoreConfig) -> IdentityStore {
    let file = JsonIdentityFile::new(config.path.clone());
    IdentityStore::load(Box::new(file), config)
}
