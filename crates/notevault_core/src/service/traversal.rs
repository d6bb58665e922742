//! Bounded hierarchy traversals.
//!
//! # Responsibility
//! - Walk ancestor chains (upward via `parent_id`) and subtrees (downward via
//!   `children`) with explicit worklists.
//!
//! # Invariants
//! - Every walk carries a seen-set keyed by folder id and terminates on
//!   cyclic data.
//! - Depth and subtree size are capped by `HierarchyLimits`.
//! - Downward walks trust `children` only when the child points back.

use crate::model::folder::{Folder, FolderId};
use crate::repo::folder_store::FolderStore;
use crate::service::error::FolderServiceError;
use log::{error, warn};
use std::collections::{HashSet, VecDeque};

pub const DEFAULT_MAX_DEPTH: usize = 1024;
pub const DEFAULT_MAX_SUBTREE_SIZE: usize = 100_000;

/// Caps applied to every hierarchy traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyLimits {
    /// Maximum number of parent hops walked from one folder.
    pub max_depth: usize,
    /// Maximum number of descendants collected under one folder.
    pub max_subtree_size: usize,
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_subtree_size: DEFAULT_MAX_SUBTREE_SIZE,
        }
    }
}

/// Outcome of walking up from one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AncestorWalk {
    /// Reached a root without meeting the target.
    ReachedRoot,
    /// Met the target id; `depth` counts hops from the start folder.
    FoundTarget { depth: usize },
}

/// Walks `parent_id` links upward from `start` looking for `target`.
///
/// `start` itself is not compared against `target`.
pub fn walk_ancestors<S: FolderStore + ?Sized>(
    store: &S,
    start: &Folder,
    target: FolderId,
    limits: HierarchyLimits,
) -> Result<AncestorWalk, FolderServiceError> {
    let mut seen = HashSet::from([start.id]);
    let mut cursor = start.parent_id;
    let mut depth = 0;

    while let Some(current) = cursor {
        depth += 1;
        if current == target {
            return Ok(AncestorWalk::FoundTarget { depth });
        }
        if !seen.insert(current) {
            error!(
                "event=hierarchy_corrupted module=traversal status=error kind=ancestor_cycle start={} folder={}",
                start.id, current
            );
            return Err(FolderServiceError::CorruptedHierarchy {
                folder_id: current,
                details: format!("ancestor chain of {} loops at {current}", start.id),
            });
        }
        if depth > limits.max_depth {
            return Err(FolderServiceError::TraversalLimitExceeded {
                folder_id: start.id,
                limit: limits.max_depth,
            });
        }

        let folder = store.get(current)?.ok_or_else(|| {
            error!(
                "event=hierarchy_corrupted module=traversal status=error kind=dangling_parent start={} folder={}",
                start.id, current
            );
            FolderServiceError::CorruptedHierarchy {
                folder_id: current,
                details: format!("ancestor {current} of {} does not exist", start.id),
            }
        })?;
        cursor = folder.parent_id;
    }

    Ok(AncestorWalk::ReachedRoot)
}

/// Collects every descendant of `root` through `children` links.
///
/// The result is ordered bottom-up: each folder appears before its parent,
/// so deleting in order never leaves a live folder under a deleted one.
/// Children entries whose document is missing are skipped.
pub fn collect_subtree<S: FolderStore + ?Sized>(
    store: &S,
    root: &Folder,
    limits: HierarchyLimits,
) -> Result<Vec<Folder>, FolderServiceError> {
    let mut seen = HashSet::from([root.id]);
    let mut queue = VecDeque::from([(root.clone(), 0_usize)]);
    let mut collected = Vec::new();

    while let Some((folder, depth)) = queue.pop_front() {
        for &child_id in &folder.children {
            if !seen.insert(child_id) {
                error!(
                    "event=hierarchy_corrupted module=traversal status=error kind=subtree_revisit root={} folder={}",
                    root.id, child_id
                );
                return Err(FolderServiceError::CorruptedHierarchy {
                    folder_id: child_id,
                    details: format!("folder {child_id} reached twice under {}", root.id),
                });
            }

            let Some(child) = store.get(child_id)? else {
                warn!(
                    "event=hierarchy_dangling_child module=traversal status=skip parent={} child={}",
                    folder.id, child_id
                );
                continue;
            };

            if child.parent_id != Some(folder.id) {
                error!(
                    "event=hierarchy_corrupted module=traversal status=error kind=parent_mismatch parent={} child={}",
                    folder.id, child_id
                );
                return Err(FolderServiceError::CorruptedHierarchy {
                    folder_id: child_id,
                    details: format!(
                        "listed as child of {} but parent_id is {}",
                        folder.id,
                        child
                            .parent_id
                            .map_or_else(|| "none".to_string(), |id| id.to_string())
                    ),
                });
            }
            if depth + 1 > limits.max_depth {
                return Err(FolderServiceError::TraversalLimitExceeded {
                    folder_id: root.id,
                    limit: limits.max_depth,
                });
            }
            if collected.len() + 1 > limits.max_subtree_size {
                return Err(FolderServiceError::TraversalLimitExceeded {
                    folder_id: root.id,
                    limit: limits.max_subtree_size,
                });
            }

            queue.push_back((child.clone(), depth + 1));
            collected.push(child);
        }
    }

    collected.reverse();
    Ok(collected)
}
