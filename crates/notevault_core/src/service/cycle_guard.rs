//! Pre-commit validation of parent assignments.
//!
//! # Responsibility
//! - Decide whether `folder -> new_parent` keeps the hierarchy a forest
//!   before any write happens.
//!
//! # Invariants
//! - Read-only: the guard never writes to the store.
//! - Rejections carry the folder and proposed parent ids.
//! - Ancestor walks are bounded by a seen-set and `HierarchyLimits`, so
//!   already-cyclic data is reported instead of looped on.

use crate::model::folder::FolderId;
use crate::repo::folder_store::FolderStore;
use crate::service::error::{CycleKind, FolderServiceError};
use crate::service::traversal::{walk_ancestors, AncestorWalk, HierarchyLimits};
use log::warn;

/// Cycle guard over one store snapshot.
pub struct CycleGuard<'store, S: FolderStore + ?Sized> {
    store: &'store S,
    limits: HierarchyLimits,
}

impl<'store, S: FolderStore + ?Sized> CycleGuard<'store, S> {
    pub fn new(store: &'store S, limits: HierarchyLimits) -> Self {
        Self { store, limits }
    }

    /// Validates moving `folder_id` under `new_parent_id`.
    ///
    /// `None` (becoming a root) always passes once the folder exists.
    ///
    /// # Errors
    /// - `NotFound` / `ParentNotFound` for missing documents.
    /// - `CircularReference` for self-parent, immediate and deep cycles.
    /// - `CorruptedHierarchy` / `TraversalLimitExceeded` when the ancestor
    ///   chain of the proposed parent is broken or too deep.
    pub fn validate_reparent(
        &self,
        folder_id: FolderId,
        new_parent_id: Option<FolderId>,
    ) -> Result<(), FolderServiceError> {
        let Some(parent_id) = new_parent_id else {
            return self.ensure_exists(folder_id);
        };

        if parent_id == folder_id {
            return Err(self.reject(folder_id, parent_id, CycleKind::SelfParent));
        }

        let folder = self
            .store
            .get(folder_id)?
            .ok_or(FolderServiceError::NotFound(folder_id))?;
        let parent = self
            .store
            .get(parent_id)?
            .ok_or(FolderServiceError::ParentNotFound(parent_id))?;

        if folder.children.contains(&parent_id) || parent.parent_id == Some(folder_id) {
            return Err(self.reject(folder_id, parent_id, CycleKind::ImmediateCycle));
        }

        match walk_ancestors(self.store, &parent, folder_id, self.limits)? {
            AncestorWalk::ReachedRoot => Ok(()),
            AncestorWalk::FoundTarget { .. } => {
                Err(self.reject(folder_id, parent_id, CycleKind::DeepCycle))
            }
        }
    }

    fn ensure_exists(&self, folder_id: FolderId) -> Result<(), FolderServiceError> {
        self.store
            .get(folder_id)?
            .map(|_| ())
            .ok_or(FolderServiceError::NotFound(folder_id))
    }

    fn reject(&self, folder_id: FolderId, parent_id: FolderId, kind: CycleKind) -> FolderServiceError {
        warn!(
            "event=cycle_rejected module=cycle_guard status=rejected kind={} folder={} parent={}",
            kind.as_str(),
            folder_id,
            parent_id
        );
        FolderServiceError::CircularReference {
            folder_id,
            parent_id,
            kind,
        }
    }
}
