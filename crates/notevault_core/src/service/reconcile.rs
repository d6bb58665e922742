//! Hierarchy consistency scan and repair planning.
//!
//! # Responsibility
//! - Report every back-reference or acyclicity violation in a snapshot.
//! - Plan the writes that restore a consistent forest after an interrupted
//!   structural mutation.
//!
//! # Invariants
//! - `children` sets are ground truth; `parent_id` is recomputed from them.
//! - Planning is pure; the folder service applies the plan under its
//!   structural lock.
//! - Applying a plan to the snapshot it was computed from yields a snapshot
//!   whose scan is empty.

use crate::model::folder::{Folder, FolderId};
use std::collections::{BTreeMap, BTreeSet};

/// One invariant violation found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyIssue {
    /// `parent` lists a child whose document does not exist.
    DanglingChild { parent_id: FolderId, child_id: FolderId },
    /// Folder's `parent_id` points at a document that does not exist.
    DanglingParent { folder_id: FolderId, parent_id: FolderId },
    /// Folder's `parent_id` points at a parent that does not list it.
    MissingBackReference { parent_id: FolderId, child_id: FolderId },
    /// Parent lists a child whose `parent_id` is something else.
    ParentMismatch {
        parent_id: FolderId,
        child_id: FolderId,
        recorded_parent: Option<FolderId>,
    },
    /// More than one folder lists the same child.
    MultipleParents {
        child_id: FolderId,
        parents: Vec<FolderId>,
    },
    /// `is_root` disagrees with `parent_id`.
    RootFlagMismatch { folder_id: FolderId },
    /// Folder's `parent_id` chain loops back on itself.
    Cycle { folder_id: FolderId },
}

/// Writes restoring consistency for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairPlan {
    /// `(parent, child)` entries to remove from `parent.children`.
    pub prune_children: Vec<(FolderId, FolderId)>,
    /// Folders whose `parent_id` / `is_root` must be rewritten.
    pub reparent: Vec<(FolderId, Option<FolderId>)>,
    /// Folders turned into roots to break a cycle.
    pub cycles_broken: Vec<FolderId>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.prune_children.is_empty() && self.reparent.is_empty()
    }
}

/// Summary returned by a repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Issues found before repair.
    pub issues: Vec<HierarchyIssue>,
    pub pruned_children: usize,
    pub reparented: Vec<(FolderId, Option<FolderId>)>,
    pub cycles_broken: Vec<FolderId>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Scans a snapshot for invariant violations.
pub fn scan(folders: &[Folder]) -> Vec<HierarchyIssue> {
    let by_id = index(folders);
    let mut issues = Vec::new();

    for folder in folders {
        if folder.is_root != folder.parent_id.is_none() {
            issues.push(HierarchyIssue::RootFlagMismatch {
                folder_id: folder.id,
            });
        }

        if let Some(parent_id) = folder.parent_id {
            match by_id.get(&parent_id) {
                None => issues.push(HierarchyIssue::DanglingParent {
                    folder_id: folder.id,
                    parent_id,
                }),
                Some(parent) if !parent.children.contains(&folder.id) => {
                    issues.push(HierarchyIssue::MissingBackReference {
                        parent_id,
                        child_id: folder.id,
                    })
                }
                Some(_) => {}
            }
        }

        for &child_id in &folder.children {
            match by_id.get(&child_id) {
                None => issues.push(HierarchyIssue::DanglingChild {
                    parent_id: folder.id,
                    child_id,
                }),
                Some(child) if child.parent_id != Some(folder.id) => {
                    issues.push(HierarchyIssue::ParentMismatch {
                        parent_id: folder.id,
                        child_id,
                        recorded_parent: child.parent_id,
                    })
                }
                Some(_) => {}
            }
        }
    }

    for (child_id, parents) in listers(&by_id) {
        if parents.len() > 1 {
            issues.push(HierarchyIssue::MultipleParents {
                child_id,
                parents: parents.into_iter().collect(),
            });
        }
    }

    let recorded: BTreeMap<FolderId, Option<FolderId>> = folders
        .iter()
        .map(|folder| (folder.id, folder.parent_id))
        .collect();
    for folder_id in find_cycles(&recorded) {
        issues.push(HierarchyIssue::Cycle { folder_id });
    }

    issues
}

/// Plans the writes that make `children` and `parent_id` agree again.
pub fn plan_repair(folders: &[Folder]) -> RepairPlan {
    let by_id = index(folders);
    let mut plan = RepairPlan::default();
    let mut pruned: BTreeSet<(FolderId, FolderId)> = BTreeSet::new();

    for folder in folders {
        for &child_id in &folder.children {
            if !by_id.contains_key(&child_id) {
                pruned.insert((folder.id, child_id));
            }
        }
    }

    let listed_by = listers(&by_id);
    let mut desired: BTreeMap<FolderId, Option<FolderId>> = BTreeMap::new();
    for folder in folders {
        let parent = listed_by.get(&folder.id).and_then(|parents| {
            let keep = folder
                .parent_id
                .filter(|recorded| parents.contains(recorded))
                .or_else(|| parents.iter().next().copied())?;
            for &other in parents.iter().filter(|&&other| other != keep) {
                pruned.insert((other, folder.id));
            }
            Some(keep)
        });
        desired.insert(folder.id, parent);
    }

    for folder_id in find_cycles(&desired) {
        if let Some(Some(parent_id)) = desired.insert(folder_id, None) {
            pruned.insert((parent_id, folder_id));
        }
        plan.cycles_broken.push(folder_id);
    }

    for folder in folders {
        let parent = desired.get(&folder.id).copied().flatten();
        if folder.parent_id != parent || folder.is_root != parent.is_none() {
            plan.reparent.push((folder.id, parent));
        }
    }

    plan.prune_children = pruned.into_iter().collect();
    plan
}

fn index(folders: &[Folder]) -> BTreeMap<FolderId, &Folder> {
    folders.iter().map(|folder| (folder.id, folder)).collect()
}

/// Maps each existing child id to the set of folders listing it.
fn listers(by_id: &BTreeMap<FolderId, &Folder>) -> BTreeMap<FolderId, BTreeSet<FolderId>> {
    let mut listed_by: BTreeMap<FolderId, BTreeSet<FolderId>> = BTreeMap::new();
    for folder in by_id.values() {
        for &child_id in &folder.children {
            if child_id != folder.id && by_id.contains_key(&child_id) {
                listed_by.entry(child_id).or_default().insert(folder.id);
            }
        }
    }
    listed_by
}

/// Returns one folder per cycle in a parent map. Cutting each returned
/// folder's parent edge leaves the map acyclic.
fn find_cycles(parents: &BTreeMap<FolderId, Option<FolderId>>) -> Vec<FolderId> {
    let mut settled: BTreeSet<FolderId> = BTreeSet::new();
    let mut cut = Vec::new();

    for &start in parents.keys() {
        if settled.contains(&start) {
            continue;
        }
        let mut path = Vec::new();
        let mut on_path = BTreeSet::new();
        let mut cursor = Some(start);

        while let Some(current) = cursor {
            if settled.contains(&current) || !parents.contains_key(&current) {
                break;
            }
            if !on_path.insert(current) {
                cut.push(current);
                break;
            }
            path.push(current);
            cursor = parents.get(&current).copied().flatten();
        }
        settled.extend(path);
    }

    cut
}
