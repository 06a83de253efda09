use super::error::SaveError;
use super::format::{decompress_and_deserialize, serialize_and_compress, HistoryFile};
use super::migration::migrate_history;
use crate::completed::CompletedMatch;

use std::fs::{remove_file, rename, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence capability for completed matches.
pub trait MatchHistoryStore: Send + Sync {
    /// Every stored match, most recent first.
    fn load_all(&self) -> Result<Vec<CompletedMatch>, SaveError>;

    /// Inserts or replaces by id.
    fn save(&self, record: &CompletedMatch) -> Result<(), SaveError>;

    fn delete(&self, id: Uuid) -> Result<(), SaveError>;

    fn wipe_all(&self) -> Result<(), SaveError>;

    fn load_recent(&self, limit: usize) -> Result<Vec<CompletedMatch>, SaveError> {
        let mut all = self.load_all()?;
        all.truncate(limit);
        Ok(all)
    }

    fn find(&self, id: Uuid) -> Result<Option<CompletedMatch>, SaveError> {
        Ok(self.load_all()?.into_iter().find(|m| m.id == id))
    }
}

/// Single-file history under `data_dir`.
#[derive(Debug)]
pub struct FileMatchHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMatchHistoryStore {
    pub const FILE_NAME: &'static str = "completed_matches.dat";

    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { path: data_dir.as_ref().join(Self::FILE_NAME), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_history(&self) -> Result<HistoryFile, SaveError> {
        match load_from_path(&self.path) {
            Ok(history) => Ok(history),
            Err(SaveError::FileNotFound { .. }) => Ok(HistoryFile::new()),
            Err(e) => Err(e),
        }
    }

    fn modify<F>(&self, f: F) -> Result<(), SaveError>
    where
        F: FnOnce(&mut HistoryFile) -> Result<(), SaveError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut history = self.read_history()?;
        f(&mut history)?;
        history.update_timestamp();
        save_to_path(&self.path, &history)
    }
}

impl MatchHistoryStore for FileMatchHistoryStore {
    fn load_all(&self) -> Result<Vec<CompletedMatch>, SaveError> {
        Ok(self.read_history()?.matches)
    }

    fn save(&self, record: &CompletedMatch) -> Result<(), SaveError> {
        self.modify(|history| {
            history.upsert(record.clone());
            Ok(())
        })?;
        log::info!("Saved completed match {}", record.id);
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<(), SaveError> {
        self.modify(|history| {
            let before = history.matches.len();
            history.matches.retain(|m| m.id != id);
            if history.matches.len() == before {
                return Err(SaveError::MatchNotFound { id });
            }
            Ok(())
        })?;
        log::info!("Deleted completed match {}", id);
        Ok(())
    }

    fn wipe_all(&self) -> Result<(), SaveError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.path.exists() {
            remove_file(&self.path)?;
            log::info!("Wiped completed match history at {:?}", self.path);
        }
        Ok(())
    }
}

fn save_to_path(path: &Path, history: &HistoryFile) -> Result<(), SaveError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serialize_and_compress(history)?;

    // Atomic save: write to temp file, then rename
    let temp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.flush()?;
        file.sync_all()?;
    }

    rename(&temp_path, path)?;

    log::debug!("Saved {} bytes to {:?}", data.len(), path);
    Ok(())
}

fn load_from_path(path: &Path) -> Result<HistoryFile, SaveError> {
    if !path.exists() {
        return Err(SaveError::FileNotFound { path: path.display().to_string() });
    }

    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let history = migrate_history(decompress_and_deserialize(&data)?)?;

    log::debug!("Loaded {} bytes from {:?}", data.len(), path);
    Ok(history)
}

/// Volatile store for tests and headless runs.
#[derive(Debug, Default)]
pub struct InMemoryMatchHistoryStore {
    history: Mutex<HistoryFile>,
    fail_saves: Mutex<bool>,
}

impl InMemoryMatchHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent saves fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatchHistoryStore for InMemoryMatchHistoryStore {
    fn load_all(&self) -> Result<Vec<CompletedMatch>, SaveError> {
        Ok(self.history.lock().unwrap_or_else(|e| e.into_inner()).matches.clone())
    }

    fn save(&self, record: &CompletedMatch) -> Result<(), SaveError> {
        if *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SaveError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "history store is read-only",
            )));
        }
        self.history.lock().unwrap_or_else(|e| e.into_inner()).upsert(record.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<(), SaveError> {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let before = history.matches.len();
        history.matches.retain(|m| m.id != id);
        if history.matches.len() == before {
            return Err(SaveError::MatchNotFound { id });
        }
        Ok(())
    }

    fn wipe_all(&self) -> Result<(), SaveError> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).matches.clear();
        Ok(())
    }
}
