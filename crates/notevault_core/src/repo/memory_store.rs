//! In-memory folder store.
//!
//! # Responsibility
//! - Provide a thread-safe store for tests and embedded callers.
//! - Simulate write failures so partial-write paths can be exercised.
//!
//! # Invariants
//! - Reads never fail; only write primitives observe injected faults.
//! - A failed write leaves the target document unchanged.

use crate::model::folder::{Folder, FolderId};
use crate::repo::folder_store::{FolderStore, StoreError, StoreResult};
use crate::repo::structure_lock::{StructureGuard, StructureLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Write primitive selector for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOp {
    Put,
    Delete,
    AddChild,
    RemoveChild,
}

#[derive(Debug, Default)]
struct FaultPlan {
    /// Writes allowed before every further write fails.
    writes_before_failure: Option<usize>,
    failing_ops: BTreeSet<StoreOp>,
}

impl FaultPlan {
    fn check(&mut self, op: StoreOp) -> StoreResult<()> {
        if self.failing_ops.contains(&op) {
            return Err(StoreError::Unavailable(format!("simulated {op:?} failure")));
        }
        match self.writes_before_failure.as_mut() {
            Some(0) => Err(StoreError::Unavailable(format!(
                "simulated {op:?} failure after write budget"
            ))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Thread-safe in-memory folder store.
#[derive(Debug, Default)]
pub struct MemoryFolderStore {
    folders: Mutex<BTreeMap<FolderId, Folder>>,
    faults: Mutex<FaultPlan>,
    structure: StructureLock,
}

impl MemoryFolderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `writes` write primitives succeed, then fails every
    /// write until faults are cleared.
    pub fn fail_writes_after(&self, writes: usize) {
        self.faults().writes_before_failure = Some(writes);
    }

    /// Fails every call to one write primitive until faults are cleared.
    pub fn fail_op(&self, op: StoreOp) {
        self.faults().failing_ops.insert(op);
    }

    pub fn clear_faults(&self) {
        *self.faults() = FaultPlan::default();
    }

    /// Inserts a document without validation or fault checks. Used to seed
    /// corrupted hierarchies.
    pub fn insert_unchecked(&self, folder: Folder) {
        self.folders().insert(folder.id, folder);
    }

    pub fn len(&self) -> usize {
        self.folders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders().is_empty()
    }

    // Every mutation completes under a single guard, so a poisoned map is
    // still consistent.
    fn folders(&self) -> MutexGuard<'_, BTreeMap<FolderId, Folder>> {
        self.folders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edit_children(
        &self,
        op: StoreOp,
        parent_id: FolderId,
        edit: impl FnOnce(&mut Folder) -> bool,
    ) -> StoreResult<()> {
        self.faults().check(op)?;
        let mut folders = self.folders();
        let parent = folders
            .get_mut(&parent_id)
            .ok_or(StoreError::NotFound(parent_id))?;
        if edit(parent) {
            parent.touch();
        }
        Ok(())
    }
}

impl FolderStore for MemoryFolderStore {
    fn get(&self, id: FolderId) -> StoreResult<Option<Folder>> {
        Ok(self.folders().get(&id).cloned())
    }

    fn put(&self, folder: &Folder) -> StoreResult<Folder> {
        folder.validate()?;
        self.faults().check(StoreOp::Put)?;
        self.folders().insert(folder.id, folder.clone());
        Ok(folder.clone())
    }

    fn delete(&self, id: FolderId) -> StoreResult<bool> {
        self.faults().check(StoreOp::Delete)?;
        Ok(self.folders().remove(&id).is_some())
    }

    fn add_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()> {
        self.edit_children(StoreOp::AddChild, parent_id, |parent| {
            parent.children.insert(child_id)
        })
    }

    fn remove_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()> {
        self.edit_children(StoreOp::RemoveChild, parent_id, |parent| {
            parent.children.remove(&child_id)
        })
    }

    fn list_all(&self) -> StoreResult<Vec<Folder>> {
        Ok(self.folders().values().cloned().collect())
    }

    fn lock_structure(&self) -> StoreResult<StructureGuard<'_>> {
        self.structure.acquire()
    }
}
