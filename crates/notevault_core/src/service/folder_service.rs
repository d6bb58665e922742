//! Folder hierarchy use-case service (mutation coordinator).
//!
//! # Responsibility
//! - Run every structural mutation as "validate, then write" over the
//!   single-record store primitives.
//! - Sequence multi-document writes so an interruption leaves a state the
//!   reconciliation pass can repair from `children` sets.
//! - Serve read accessors without taking the structural lock.
//!
//! # Invariants
//! - Cycle guard rejection aborts with zero writes.
//! - Move order: unlink from old parent, link to new parent, then rewrite
//!   the moving folder's `parent_id`.
//! - Delete order: descendants bottom-up, then the folder, then unlink from
//!   its former parent. No live folder ever points at a deleted parent.
//! - Whole-document writes hold the store's structural lock, so a `put`
//!   never clobbers a concurrent `children` edit, and services sharing one
//!   store never interleave check-then-write sequences.
//! - Failures after the first committed write surface as
//!   `PartialWriteFailure`; nothing is retried. Skipped unlinks from a
//!   vanished parent are not commits.

use crate::model::folder::{Folder, FolderId, FolderPatch, NewFolder, NoteId};
use crate::repo::folder_store::{FolderStore, StoreError, StoreResult};
use crate::repo::structure_lock::StructureGuard;
use crate::service::cycle_guard::CycleGuard;
use crate::service::error::{FolderServiceError, WriteStep};
use crate::service::reconcile::{plan_repair, scan, HierarchyIssue, RepairReport};
use crate::service::traversal::{collect_subtree, HierarchyLimits};
use log::{error, info, warn};
use std::time::Instant;
use uuid::Uuid;

pub type FolderServiceResult<T> = Result<T, FolderServiceError>;

/// Folder hierarchy service facade.
pub struct FolderService<S: FolderStore> {
    store: S,
    limits: HierarchyLimits,
}

impl<S: FolderStore> FolderService<S> {
    /// Creates a service with default traversal limits.
    pub fn new(store: S) -> Self {
        Self::with_limits(store, HierarchyLimits::default())
    }

    pub fn with_limits(store: S, limits: HierarchyLimits) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limits(&self) -> HierarchyLimits {
        self.limits
    }

    /// Loads one folder.
    pub fn get_folder(&self, folder_id: FolderId) -> FolderServiceResult<Folder> {
        self.store
            .get(folder_id)?
            .ok_or(FolderServiceError::NotFound(folder_id))
    }

    /// Lists every folder ordered by id.
    pub fn list_folders(&self) -> FolderServiceResult<Vec<Folder>> {
        Ok(self.store.list_all()?)
    }

    /// Lists the folders in `folder_id`'s `children` set.
    ///
    /// Entries whose document no longer exists are skipped.
    pub fn list_children(&self, folder_id: FolderId) -> FolderServiceResult<Vec<Folder>> {
        let folder = self.get_folder(folder_id)?;
        let mut children = Vec::with_capacity(folder.children.len());
        for child_id in folder.children {
            if let Some(child) = self.store.get(child_id)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Creates a folder, linking it into its parent's `children` when a
    /// parent is given.
    ///
    /// # Errors
    /// - `Validation` for invalid fields, `ParentNotFound` for a missing
    ///   parent; neither writes anything.
    /// - `PartialWriteFailure { step: LinkToParent }` when the folder was
    ///   persisted but the parent link failed.
    pub fn create_folder(&self, input: NewFolder) -> FolderServiceResult<Folder> {
        let _guard = self.lock_structure()?;
        let started_at = Instant::now();

        let folder = Folder::from_new(input);
        folder.validate()?;
        if let Some(parent_id) = folder.parent_id {
            self.store
                .get(parent_id)?
                .ok_or(FolderServiceError::ParentNotFound(parent_id))?;
        }

        let mut writes = WriteSequence::new("folder_create", folder.id);
        let created = writes.step(WriteStep::PersistFolder, None, self.store.put(&folder))?;
        if let Some(parent_id) = created.parent_id {
            writes.step(
                WriteStep::LinkToParent,
                Some(parent_id),
                self.store.add_child(parent_id, created.id),
            )?;
        }

        info!(
            "event=folder_create module=folder_service status=ok folder={} has_parent={} duration_ms={}",
            created.id,
            created.parent_id.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(created)
    }

    /// Edits name, description or tags. Structural fields are untouched.
    pub fn update_folder(
        &self,
        folder_id: FolderId,
        patch: FolderPatch,
    ) -> FolderServiceResult<Folder> {
        self.rewrite_document(folder_id, "folder_update", |folder| folder.apply_patch(patch))
    }

    /// Adds a note id to the folder's `note_refs`.
    pub fn attach_note(&self, folder_id: FolderId, note_id: NoteId) -> FolderServiceResult<Folder> {
        self.rewrite_document(folder_id, "note_attach", |folder| {
            if folder.note_refs.insert(note_id) {
                folder.touch();
            }
        })
    }

    /// Removes a note id from the folder's `note_refs`.
    pub fn detach_note(&self, folder_id: FolderId, note_id: NoteId) -> FolderServiceResult<Folder> {
        self.rewrite_document(folder_id, "note_detach", |folder| {
            if folder.note_refs.remove(&note_id) {
                folder.touch();
            }
        })
    }

    /// Moves `folder_id` under `new_parent_id`, or to the root level for
    /// `None`.
    ///
    /// # Errors
    /// - `CircularReference` when the cycle guard vetoes the edge.
    /// - `PartialWriteFailure` naming the failed step once a write committed.
    pub fn move_folder(
        &self,
        folder_id: FolderId,
        new_parent_id: Option<FolderId>,
    ) -> FolderServiceResult<Folder> {
        let _guard = self.lock_structure()?;
        let started_at = Instant::now();

        let mut folder = self.get_folder(folder_id)?;
        CycleGuard::new(&self.store, self.limits).validate_reparent(folder_id, new_parent_id)?;

        if folder.parent_id == new_parent_id {
            info!(
                "event=folder_move module=folder_service status=noop folder={}",
                folder_id
            );
            return Ok(folder);
        }

        let old_parent_id = folder.parent_id;
        let mut writes = WriteSequence::new("folder_move", folder_id);
        if let Some(old_parent_id) = old_parent_id {
            writes.unlink(
                WriteStep::UnlinkFromOldParent,
                old_parent_id,
                self.store.remove_child(old_parent_id, folder_id),
            )?;
        }
        if let Some(new_parent_id) = new_parent_id {
            writes.step(
                WriteStep::LinkToNewParent,
                Some(new_parent_id),
                self.store.add_child(new_parent_id, folder_id),
            )?;
        }

        folder.set_parent(new_parent_id);
        let moved = writes.step(WriteStep::UpdateParentRef, None, self.store.put(&folder))?;

        info!(
            "event=folder_move module=folder_service status=ok folder={} from={} to={} duration_ms={}",
            folder_id,
            display_parent(old_parent_id),
            display_parent(new_parent_id),
            started_at.elapsed().as_millis()
        );
        Ok(moved)
    }

    /// Deletes a folder and its whole subtree, then unlinks it from its
    /// former parent.
    ///
    /// Returns the deleted ids, descendants first.
    pub fn delete_folder(&self, folder_id: FolderId) -> FolderServiceResult<Vec<FolderId>> {
        let _guard = self.lock_structure()?;
        let started_at = Instant::now();

        let folder = self.get_folder(folder_id)?;
        let descendants = collect_subtree(&self.store, &folder, self.limits)?;

        let mut writes = WriteSequence::new("folder_delete", folder_id);
        let mut deleted = Vec::with_capacity(descendants.len() + 1);
        for descendant in &descendants {
            writes.step(
                WriteStep::DeleteDescendant,
                Some(descendant.id),
                self.store.delete(descendant.id),
            )?;
            deleted.push(descendant.id);
        }
        writes.step(WriteStep::DeleteFolder, None, self.store.delete(folder_id))?;
        deleted.push(folder_id);

        if let Some(parent_id) = folder.parent_id {
            writes.unlink(
                WriteStep::UnlinkFromParent,
                parent_id,
                self.store.remove_child(parent_id, folder_id),
            )?;
        }

        info!(
            "event=folder_delete module=folder_service status=ok folder={} deleted_count={} duration_ms={}",
            folder_id,
            deleted.len(),
            started_at.elapsed().as_millis()
        );
        Ok(deleted)
    }

    /// Reports every hierarchy invariant violation. Read-only.
    pub fn check_hierarchy(&self) -> FolderServiceResult<Vec<HierarchyIssue>> {
        let folders = self.store.list_all()?;
        let issues = scan(&folders);
        info!(
            "event=hierarchy_check module=folder_service status=ok folders={} issues={}",
            folders.len(),
            issues.len()
        );
        Ok(issues)
    }

    /// Restores back-reference consistency and acyclicity, trusting
    /// `children` sets over `parent_id`.
    ///
    /// Safe to re-run after a partial failure: each run plans from the
    /// current snapshot.
    pub fn repair_hierarchy(&self) -> FolderServiceResult<RepairReport> {
        let _guard = self.lock_structure()?;
        let started_at = Instant::now();

        let folders = self.store.list_all()?;
        let issues = scan(&folders);
        if issues.is_empty() {
            return Ok(RepairReport::default());
        }
        let plan = plan_repair(&folders);

        let mut writes = WriteSequence::new("hierarchy_repair", Uuid::nil());
        for &(parent_id, child_id) in &plan.prune_children {
            writes.step(
                WriteStep::RepairPruneChild,
                Some(parent_id),
                self.store.remove_child(parent_id, child_id),
            )?;
        }
        for &(folder_id, parent_id) in &plan.reparent {
            let Some(mut folder) = folders.iter().find(|folder| folder.id == folder_id).cloned()
            else {
                continue;
            };
            folder.set_parent(parent_id);
            if let Some(current) = self.store.get(folder_id)? {
                // Keep the children set written by the prune step above.
                folder.children = current.children;
            }
            writes.step(WriteStep::RepairParentRef, Some(folder_id), self.store.put(&folder))?;
        }

        for folder_id in &plan.cycles_broken {
            warn!(
                "event=hierarchy_repair module=folder_service status=cycle_broken folder={}",
                folder_id
            );
        }
        info!(
            "event=hierarchy_repair module=folder_service status=ok issues={} pruned={} reparented={} duration_ms={}",
            issues.len(),
            plan.prune_children.len(),
            plan.reparent.len(),
            started_at.elapsed().as_millis()
        );

        Ok(RepairReport {
            issues,
            pruned_children: plan.prune_children.len(),
            reparented: plan.reparent,
            cycles_broken: plan.cycles_broken,
        })
    }

    fn rewrite_document(
        &self,
        folder_id: FolderId,
        event: &'static str,
        edit: impl FnOnce(&mut Folder),
    ) -> FolderServiceResult<Folder> {
        let _guard = self.lock_structure()?;
        let mut folder = self.get_folder(folder_id)?;
        edit(&mut folder);
        folder.validate()?;
        let saved = self.store.put(&folder)?;
        info!(
            "event={} module=folder_service status=ok folder={}",
            event, folder_id
        );
        Ok(saved)
    }

    fn lock_structure(&self) -> FolderServiceResult<StructureGuard<'_>> {
        Ok(self.store.lock_structure()?)
    }
}

/// Tracks committed writes of one multi-document mutation.
struct WriteSequence {
    event: &'static str,
    folder_id: FolderId,
    committed: usize,
}

impl WriteSequence {
    fn new(event: &'static str, folder_id: FolderId) -> Self {
        Self {
            event,
            folder_id,
            committed: 0,
        }
    }

    /// Records an unlink from `parent_id`. A parent whose document is already
    /// gone needs no write, so the skip is not counted as a commit.
    fn unlink(
        &mut self,
        step: WriteStep,
        parent_id: FolderId,
        result: StoreResult<()>,
    ) -> FolderServiceResult<()> {
        match result {
            Err(StoreError::NotFound(missing)) if missing == parent_id => {
                warn!(
                    "event=hierarchy_dangling_parent module=folder_service status=skip step={} parent={} folder={}",
                    step, parent_id, self.folder_id
                );
                Ok(())
            }
            other => self.step(step, Some(parent_id), other),
        }
    }

    /// Records one write result. Failures before any commit are plain store
    /// errors; later failures become `PartialWriteFailure`.
    fn step<T>(
        &mut self,
        step: WriteStep,
        related_id: Option<FolderId>,
        result: StoreResult<T>,
    ) -> FolderServiceResult<T> {
        match result {
            Ok(value) => {
                self.committed += 1;
                Ok(value)
            }
            Err(err) if self.committed == 0 => {
                error!(
                    "event={} module=folder_service status=error step={} folder={} committed=0 error={}",
                    self.event, step, self.folder_id, err
                );
                Err(err.into())
            }
            Err(source) => {
                error!(
                    "event={} module=folder_service status=partial_write step={} folder={} related={} committed={} error={}",
                    self.event,
                    step,
                    self.folder_id,
                    related_id.map_or_else(|| "none".to_string(), |id| id.to_string()),
                    self.committed,
                    source
                );
                Err(FolderServiceError::PartialWriteFailure {
                    step,
                    folder_id: self.folder_id,
                    related_id,
                    source,
                })
            }
        }
    }
}

fn display_parent(parent_id: Option<FolderId>) -> String {
    parent_id.map_or_else(|| "root".to_string(), |id| id.to_string())
}
