//! Store-wide structural mutation lock.
//!
//! # Responsibility
//! - Serialize structural mutations of one folder graph across every service
//!   and thread sharing the store.
//! - For file databases, extend exclusion across store instances and
//!   processes with an exclusive lock on a sidecar lock file.
//!
//! # Invariants
//! - The in-process mutex is always taken before the file lock.
//! - The file lock is released before the in-process mutex.

use crate::repo::folder_store::{StoreError, StoreResult};
use fs2::FileExt;
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const LOCK_FILE_SUFFIX: &str = ".structure.lock";

/// Lock owned by a store; every `FolderService` over that store shares it.
#[derive(Debug, Default)]
pub struct StructureLock {
    local: Mutex<()>,
    lock_file: Option<PathBuf>,
}

impl StructureLock {
    /// Lock scoped to the current process only.
    pub fn in_process() -> Self {
        Self::default()
    }

    /// Lock that also holds `<db_path>.structure.lock` exclusively.
    pub fn for_database_file(db_path: &Path) -> Self {
        let mut name = db_path.as_os_str().to_owned();
        name.push(LOCK_FILE_SUFFIX);
        Self {
            local: Mutex::new(()),
            lock_file: Some(PathBuf::from(name)),
        }
    }

    pub fn lock_file(&self) -> Option<&Path> {
        self.lock_file.as_deref()
    }

    /// Blocks until the structural lock is held.
    ///
    /// # Errors
    /// - `Unavailable` when the lock file cannot be opened or locked.
    pub fn acquire(&self) -> StoreResult<StructureGuard<'_>> {
        // Guards no data, so a poisoned mutex is still usable.
        let local = self.local.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match &self.lock_file {
            Some(path) => Some(lock_exclusive(path)?),
            None => None,
        };
        Ok(StructureGuard {
            file,
            _local: local,
        })
    }
}

/// Held structural lock. Released on drop.
#[derive(Debug)]
pub struct StructureGuard<'a> {
    file: Option<File>,
    _local: MutexGuard<'a, ()>,
}

impl Drop for StructureGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = FileExt::unlock(&file) {
                warn!(
                    "event=structure_unlock module=store status=error error={}",
                    err
                );
            }
        }
    }
}

fn lock_exclusive(path: &Path) -> StoreResult<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|err| {
            StoreError::Unavailable(format!(
                "cannot open structure lock file `{}`: {err}",
                path.display()
            ))
        })?;
    file.lock_exclusive().map_err(|err| {
        StoreError::Unavailable(format!(
            "cannot lock structure lock file `{}`: {err}",
            path.display()
        ))
    })?;
    debug!(
        "event=structure_lock module=store status=ok lock_file={}",
        path.display()
    );
    Ok(file)
}
