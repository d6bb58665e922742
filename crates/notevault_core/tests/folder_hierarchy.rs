use notevault_core::{
    CycleKind, Folder, FolderId, FolderPatch, FolderService, FolderServiceError,
    FolderStore, FolderValidationError, HierarchyIssue, MemoryFolderStore, NewFolder,
    SqliteFolderStore,
};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

/// Runs each scenario once per store backend.
macro_rules! on_both_stores {
    ($($scenario:ident),* $(,)?) => {
        mod memory_store {
            $(
                #[test]
                fn $scenario() {
                    super::$scenario(super::FolderService::new(super::MemoryFolderStore::new()));
                }
            )*
        }

        mod sqlite_store {
            $(
                #[test]
                fn $scenario() {
                    let store = super::SqliteFolderStore::open_in_memory().unwrap();
                    super::$scenario(super::FolderService::new(store));
                }
            )*
        }
    };
}

on_both_stores!(
    create_links_child_into_parent,
    create_with_missing_parent_writes_nothing,
    create_rejects_invalid_name,
    self_parent_move_is_rejected_without_writes,
    immediate_cycle_move_is_rejected_without_writes,
    deep_cycle_move_is_rejected_without_writes,
    read_after_move_sees_new_parent,
    move_to_root_and_repeated_move,
    cascade_delete_removes_subtree_and_unlinks,
    accepted_moves_keep_hierarchy_acyclic,
    field_and_note_edits_leave_structure_alone,
    list_children_returns_linked_folders,
    existing_cycle_is_reported_not_looped_on,
    child_claimed_by_wrong_parent_aborts_delete,
    concurrent_opposing_moves_never_both_succeed,
);

fn owner() -> Uuid {
    Uuid::from_u128(0x5eed)
}

fn root<S: FolderStore>(service: &FolderService<S>, name: &str) -> Folder {
    service.create_folder(NewFolder::root(owner(), name)).unwrap()
}

fn child<S: FolderStore>(service: &FolderService<S>, name: &str, parent: &Folder) -> Folder {
    service
        .create_folder(NewFolder::child(owner(), name, parent.id))
        .unwrap()
}

fn reload<S: FolderStore>(service: &FolderService<S>, folder: &Folder) -> Folder {
    service.get_folder(folder.id).unwrap()
}

/// Asserts back-reference consistency and acyclicity over the whole store.
fn assert_consistent<S: FolderStore>(service: &FolderService<S>) {
    let issues = service.check_hierarchy().unwrap();
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");

    let folders = service.list_folders().unwrap();
    for folder in &folders {
        let mut seen = HashSet::from([folder.id]);
        let mut cursor = folder.parent_id;
        while let Some(parent_id) = cursor {
            assert!(seen.insert(parent_id), "cycle through {parent_id}");
            cursor = service.get_folder(parent_id).unwrap().parent_id;
        }
    }
}

fn assert_cycle_rejected<S: FolderStore>(
    service: &FolderService<S>,
    folder: &Folder,
    parent: &Folder,
    expected: CycleKind,
) {
    let before = service.list_folders().unwrap();
    match service.move_folder(folder.id, Some(parent.id)) {
        Err(FolderServiceError::CircularReference {
            folder_id,
            parent_id,
            kind,
        }) => {
            assert_eq!(folder_id, folder.id);
            assert_eq!(parent_id, parent.id);
            assert_eq!(kind, expected);
        }
        other => panic!("expected circular reference, got {other:?}"),
    }
    assert_eq!(service.list_folders().unwrap(), before);
}

fn create_links_child_into_parent<S: FolderStore>(service: FolderService<S>) {
    let parent = root(&service, "Projects");
    let created = child(&service, "Rust Notes", &parent);

    assert!(parent.is_root);
    assert!(!created.is_root);
    assert_eq!(created.parent_id, Some(parent.id));
    assert!(reload(&service, &parent).children.contains(&created.id));
    assert_consistent(&service);
}

fn create_with_missing_parent_writes_nothing<S: FolderStore>(service: FolderService<S>) {
    let missing = Uuid::new_v4();
    let err = service
        .create_folder(NewFolder::child(owner(), "Orphan", missing))
        .unwrap_err();

    assert!(matches!(err, FolderServiceError::ParentNotFound(id) if id == missing));
    assert!(service.list_folders().unwrap().is_empty());
}

fn create_rejects_invalid_name<S: FolderStore>(service: FolderService<S>) {
    let err = service
        .create_folder(NewFolder::root(owner(), "  ab  "))
        .unwrap_err();

    assert!(matches!(
        err,
        FolderServiceError::Validation(FolderValidationError::NameLength { chars: 2 })
    ));
    assert!(service.list_folders().unwrap().is_empty());
}

fn self_parent_move_is_rejected_without_writes<S: FolderStore>(service: FolderService<S>) {
    let parent = root(&service, "Parent");
    let folder = child(&service, "Folder", &parent);

    assert_cycle_rejected(&service, &folder, &folder, CycleKind::SelfParent);
    assert_cycle_rejected(&service, &parent, &parent, CycleKind::SelfParent);
}

fn immediate_cycle_move_is_rejected_without_writes<S: FolderStore>(service: FolderService<S>) {
    let r = root(&service, "Root");
    let c = child(&service, "Child", &r);

    assert_cycle_rejected(&service, &r, &c, CycleKind::ImmediateCycle);
    assert_consistent(&service);
}

fn deep_cycle_move_is_rejected_without_writes<S: FolderStore>(service: FolderService<S>) {
    let a = root(&service, "Alpha");
    let b = child(&service, "Beta", &a);
    let c = child(&service, "Gamma", &b);
    let d = child(&service, "Delta", &c);

    assert_cycle_rejected(&service, &a, &c, CycleKind::DeepCycle);
    assert_cycle_rejected(&service, &a, &d, CycleKind::DeepCycle);
    assert_cycle_rejected(&service, &b, &d, CycleKind::DeepCycle);
    assert_consistent(&service);
}

fn read_after_move_sees_new_parent<S: FolderStore>(service: FolderService<S>) {
    let old_parent = root(&service, "Old Parent");
    let new_parent = root(&service, "New Parent");
    let folder = child(&service, "Moving", &old_parent);
    let grandchild = child(&service, "Along For Ride", &folder);

    let moved = service.move_folder(folder.id, Some(new_parent.id)).unwrap();

    assert_eq!(moved.parent_id, Some(new_parent.id));
    assert_eq!(reload(&service, &folder).parent_id, Some(new_parent.id));
    assert!(!reload(&service, &folder).is_root);
    assert!(reload(&service, &new_parent).children.contains(&folder.id));
    assert!(!reload(&service, &old_parent).children.contains(&folder.id));
    assert!(reload(&service, &folder).children.contains(&grandchild.id));
    assert_consistent(&service);
}

fn move_to_root_and_repeated_move<S: FolderStore>(service: FolderService<S>) {
    let parent = root(&service, "Parent");
    let folder = child(&service, "Detached", &parent);

    let moved = service.move_folder(folder.id, None).unwrap();
    assert!(moved.is_root);
    assert_eq!(moved.parent_id, None);
    assert!(reload(&service, &parent).children.is_empty());

    let again = service.move_folder(folder.id, None).unwrap();
    assert_eq!(again, reload(&service, &folder));

    service.move_folder(folder.id, Some(parent.id)).unwrap();
    service.move_folder(folder.id, Some(parent.id)).unwrap();
    assert_eq!(reload(&service, &parent).children.len(), 1);
    assert_consistent(&service);
}

fn cascade_delete_removes_subtree_and_unlinks<S: FolderStore>(service: FolderService<S>) {
    let top = root(&service, "Top");
    let a = child(&service, "Alpha", &top);
    let b = child(&service, "Beta", &a);
    let c = child(&service, "Gamma", &b);
    let sibling = child(&service, "Sibling", &top);

    let deleted = service.delete_folder(a.id).unwrap();

    assert_eq!(deleted, vec![c.id, b.id, a.id]);
    for gone in [&a, &b, &c] {
        assert!(matches!(
            service.get_folder(gone.id),
            Err(FolderServiceError::NotFound(id)) if id == gone.id
        ));
    }
    let top = reload(&service, &top);
    assert!(!top.children.contains(&a.id));
    assert!(top.children.contains(&sibling.id));
    assert_consistent(&service);

    assert!(matches!(
        service.delete_folder(a.id),
        Err(FolderServiceError::NotFound(_))
    ));

    let deleted = service.delete_folder(top.id).unwrap();
    assert_eq!(deleted, vec![sibling.id, top.id]);
    assert!(service.list_folders().unwrap().is_empty());
}

fn accepted_moves_keep_hierarchy_acyclic<S: FolderStore>(service: FolderService<S>) {
    let mut folders = vec![root(&service, "Folder 0")];
    for index in 1..8 {
        let parent = folders[index / 2].clone();
        folders.push(child(&service, &format!("Folder {index}"), &parent));
    }

    for step in 0..64_usize {
        let folder = &folders[(step * 5 + 3) % folders.len()];
        let parent = match step % 7 {
            0 => None,
            _ => Some(folders[(step * 3 + 1) % folders.len()].id),
        };
        match service.move_folder(folder.id, parent) {
            Ok(moved) => assert_eq!(moved.parent_id, parent),
            Err(FolderServiceError::CircularReference { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert_consistent(&service);
    }
}

fn field_and_note_edits_leave_structure_alone<S: FolderStore>(service: FolderService<S>) {
    let parent = root(&service, "Parent");
    let folder = child(&service, "Drafts", &parent);
    let note = Uuid::new_v4();

    let updated = service
        .update_folder(
            folder.id,
            FolderPatch {
                name: Some("Final Drafts".to_string()),
                description: Some(Some("ready for review".to_string())),
                tags: Some(vec!["writing".to_string()]),
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Final Drafts");
    assert_eq!(updated.parent_id, Some(parent.id));
    assert_eq!(updated.children, folder.children);

    let err = service
        .update_folder(
            folder.id,
            FolderPatch {
                name: Some("x".repeat(31)),
                ..FolderPatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, FolderServiceError::Validation(_)));
    assert_eq!(reload(&service, &folder).name, "Final Drafts");

    let attached = service.attach_note(folder.id, note).unwrap();
    assert!(attached.note_refs.contains(&note));
    let detached = service.detach_note(folder.id, note).unwrap();
    assert!(detached.note_refs.is_empty());

    assert!(matches!(
        service.attach_note(Uuid::new_v4(), note),
        Err(FolderServiceError::NotFound(_))
    ));
    assert_consistent(&service);
}

fn list_children_returns_linked_folders<S: FolderStore>(service: FolderService<S>) {
    let parent = root(&service, "Parent");
    let first = child(&service, "First", &parent);
    let second = child(&service, "Second", &parent);
    child(&service, "Nested", &first);

    let ids: HashSet<FolderId> = service
        .list_children(parent.id)
        .unwrap()
        .into_iter()
        .map(|folder| folder.id)
        .collect();
    assert_eq!(ids, HashSet::from([first.id, second.id]));
    assert!(service.list_children(second.id).unwrap().is_empty());
}

fn existing_cycle_is_reported_not_looped_on<S: FolderStore>(service: FolderService<S>) {
    let mut a = root(&service, "Loop A");
    let mut b = root(&service, "Loop B");
    let outsider = root(&service, "Outsider");
    a.set_parent(Some(b.id));
    a.children.insert(b.id);
    b.set_parent(Some(a.id));
    b.children.insert(a.id);
    service.store().put(&a).unwrap();
    service.store().put(&b).unwrap();

    assert!(matches!(
        service.move_folder(outsider.id, Some(a.id)),
        Err(FolderServiceError::CorruptedHierarchy { .. })
    ));
    assert!(matches!(
        service.delete_folder(a.id),
        Err(FolderServiceError::CorruptedHierarchy { .. })
    ));
    assert!(service
        .check_hierarchy()
        .unwrap()
        .iter()
        .any(|issue| matches!(issue, HierarchyIssue::Cycle { .. })));

    let report = service.repair_hierarchy().unwrap();
    assert_eq!(report.cycles_broken.len(), 1);
    assert_consistent(&service);
}

fn child_claimed_by_wrong_parent_aborts_delete<S: FolderStore>(service: FolderService<S>) {
    let claimant = root(&service, "Claimant");
    let real_parent = root(&service, "Real Parent");
    let contested = child(&service, "Contested", &real_parent);
    let mut claimant = reload(&service, &claimant);
    claimant.children.insert(contested.id);
    service.store().put(&claimant).unwrap();
    let before = service.list_folders().unwrap();

    match service.delete_folder(claimant.id) {
        Err(FolderServiceError::CorruptedHierarchy { folder_id, .. }) => {
            assert_eq!(folder_id, contested.id);
        }
        other => panic!("expected corrupted hierarchy, got {other:?}"),
    }
    assert_eq!(service.list_folders().unwrap(), before);
    assert!(service
        .check_hierarchy()
        .unwrap()
        .contains(&HierarchyIssue::ParentMismatch {
            parent_id: claimant.id,
            child_id: contested.id,
            recorded_parent: Some(real_parent.id),
        }));
}

fn concurrent_opposing_moves_never_both_succeed<S>(service: FolderService<S>)
where
    S: FolderStore + Send + Sync + 'static,
{
    let service = Arc::new(service);
    for round in 0..16 {
        let a = root(&service, &format!("Left {round}"));
        let b = root(&service, &format!("Right {round}"));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [(a.id, b.id), (b.id, a.id)]
            .into_iter()
            .map(|(folder_id, parent_id)| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.move_folder(folder_id, Some(parent_id))
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results.iter().any(|result| matches!(
            result,
            Err(FolderServiceError::CircularReference { .. })
        )));
        assert_consistent(&service);
    }
}

#[test]
fn many_threads_moving_the_same_tree_keep_it_consistent() {
    let service = Arc::new(FolderService::new(MemoryFolderStore::new()));
    let mut ids = vec![root(&service, "Shared 0").id];
    for index in 1..12 {
        let parent = service.get_folder(ids[(index - 1) / 3]).unwrap();
        ids.push(child(&service, &format!("Shared {index}"), &parent).id);
    }
    let ids = Arc::new(ids);

    let handles: Vec<_> = (0..6_usize)
        .map(|worker| {
            let service = Arc::clone(&service);
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                for step in 0..40_usize {
                    let folder_id = ids[(step * 7 + worker) % ids.len()];
                    let parent_id = ids[(step * 3 + worker * 5) % ids.len()];
                    match service.move_folder(folder_id, Some(parent_id)) {
                        Ok(_) | Err(FolderServiceError::CircularReference { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(service.list_folders().unwrap().len(), ids.len());
    assert_consistent(&service);
}

#[test]
fn file_backed_store_survives_reopen_with_consistent_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");

    let (parent, folder) = {
        let service = FolderService::new(SqliteFolderStore::open(&path).unwrap());
        let parent = root(&service, "Archive");
        let other = root(&service, "Current");
        let folder = child(&service, "Reports", &other);
        service.move_folder(folder.id, Some(parent.id)).unwrap();
        (parent, folder)
    };

    let service = FolderService::new(SqliteFolderStore::open(&path).unwrap());
    assert_eq!(reload(&service, &folder).parent_id, Some(parent.id));
    assert!(reload(&service, &parent).children.contains(&folder.id));
    assert_consistent(&service);
}

#[test]
fn folder_document_serializes_with_stable_field_names() {
    let service = FolderService::new(MemoryFolderStore::new());
    let parent = root(&service, "Parent");
    let folder = child(&service, "Serialized", &parent);

    let value = serde_json::to_value(&folder).unwrap();
    assert_eq!(value["name"], "Serialized");
    assert_eq!(value["parent_id"], parent.id.to_string());
    assert_eq!(value["is_root"], false);
    assert!(value["children"].as_array().unwrap().is_empty());
    assert!(value.get("description").is_none());
}

/// Races `left: a -> b` against `right: b -> a` on two services over one graph.
fn race_opposing_moves_across<S>(
    left: Arc<FolderService<S>>,
    right: Arc<FolderService<S>>,
    rounds: usize,
) where
    S: FolderStore + Send + Sync + 'static,
{
    for round in 0..rounds {
        let a = root(&left, &format!("Left {round}"));
        let b = root(&left, &format!("Right {round}"));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [(Arc::clone(&left), a.id, b.id), (Arc::clone(&right), b.id, a.id)]
            .into_iter()
            .map(|(service, folder_id, parent_id)| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.move_folder(folder_id, Some(parent_id))
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(
            results.iter().filter(|result| result.is_ok()).count(),
            1,
            "round {round}: {results:?}"
        );
        assert!(results.iter().any(|result| matches!(
            result,
            Err(FolderServiceError::CircularReference { .. })
        )));
    }
    assert_consistent(&left);
    assert_consistent(&right);
}

#[test]
fn services_sharing_one_store_serialize_structural_mutations() {
    let store = Arc::new(MemoryFolderStore::new());
    let left = Arc::new(FolderService::new(Arc::clone(&store)));
    let right = Arc::new(FolderService::new(Arc::clone(&store)));

    race_opposing_moves_across(left, right, 500);
}

#[test]
fn stores_opened_on_same_file_serialize_structural_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let left = Arc::new(FolderService::new(SqliteFolderStore::open(&path).unwrap()));
    let right = Arc::new(FolderService::new(SqliteFolderStore::open(&path).unwrap()));

    race_opposing_moves_across(left, right, 25);
}
