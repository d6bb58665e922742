//! Error taxonomy for folder hierarchy operations.

use crate::model::folder::{FolderId, FolderValidationError};
use crate::repo::folder_store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Shape of a rejected parent assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Folder proposed as its own parent.
    SelfParent,
    /// Proposed parent is a direct child of the folder.
    ImmediateCycle,
    /// Proposed parent is a deeper descendant of the folder.
    DeepCycle,
}

impl CycleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfParent => "self_parent",
            Self::ImmediateCycle => "immediate_cycle",
            Self::DeepCycle => "deep_cycle",
        }
    }
}

/// Sub-step of a multi-document write sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    PersistFolder,
    LinkToParent,
    UnlinkFromOldParent,
    LinkToNewParent,
    UpdateParentRef,
    DeleteDescendant,
    DeleteFolder,
    UnlinkFromParent,
    RepairPruneChild,
    RepairParentRef,
}

impl WriteStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersistFolder => "persist_folder",
            Self::LinkToParent => "link_to_parent",
            Self::UnlinkFromOldParent => "unlink_from_old_parent",
            Self::LinkToNewParent => "link_to_new_parent",
            Self::UpdateParentRef => "update_parent_ref",
            Self::DeleteDescendant => "delete_descendant",
            Self::DeleteFolder => "delete_folder",
            Self::UnlinkFromParent => "unlink_from_parent",
            Self::RepairPruneChild => "repair_prune_child",
            Self::RepairParentRef => "repair_parent_ref",
        }
    }
}

impl Display for WriteStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from folder service operations.
#[derive(Debug)]
pub enum FolderServiceError {
    /// Target folder does not exist.
    NotFound(FolderId),
    /// Requested parent folder does not exist.
    ParentNotFound(FolderId),
    /// Folder fields failed model validation.
    Validation(FolderValidationError),
    /// Parent assignment would create a cycle. No write was performed.
    CircularReference {
        folder_id: FolderId,
        parent_id: FolderId,
        kind: CycleKind,
    },
    /// A multi-document write failed after earlier steps committed.
    PartialWriteFailure {
        step: WriteStep,
        folder_id: FolderId,
        related_id: Option<FolderId>,
        source: StoreError,
    },
    /// Persisted back-references disagree or loop.
    CorruptedHierarchy { folder_id: FolderId, details: String },
    /// Traversal exceeded configured depth or subtree size.
    TraversalLimitExceeded { folder_id: FolderId, limit: usize },
    /// Storage failure before any write committed.
    Store(StoreError),
}

impl Display for FolderServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "folder not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent folder not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::CircularReference {
                folder_id,
                parent_id,
                kind,
            } => write!(
                f,
                "circular reference ({}): folder {folder_id} under parent {parent_id}",
                kind.as_str()
            ),
            Self::PartialWriteFailure {
                step,
                folder_id,
                related_id,
                source,
            } => match related_id {
                Some(related_id) => write!(
                    f,
                    "partial write at step {step} for folder {folder_id} (related {related_id}): {source}"
                ),
                None => write!(
                    f,
                    "partial write at step {step} for folder {folder_id}: {source}"
                ),
            },
            Self::CorruptedHierarchy { folder_id, details } => {
                write!(f, "corrupted hierarchy at folder {folder_id}: {details}")
            }
            Self::TraversalLimitExceeded { folder_id, limit } => write!(
                f,
                "hierarchy traversal from folder {folder_id} exceeded limit {limit}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FolderServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::PartialWriteFailure { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for FolderServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Validation(err) => Self::Validation(err),
            other => Self::Store(other),
        }
    }
}

impl From<FolderValidationError> for FolderServiceError {
    fn from(value: FolderValidationError) -> Self {
        Self::Validation(value)
    }
}
