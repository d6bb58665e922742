//! SQLite-backed folder document store.
//!
//! # Responsibility
//! - Persist folder documents as JSON bodies keyed by id.
//! - Implement child-set edits as single-document read-modify-write.
//!
//! # Invariants
//! - Each primitive runs in its own `IMMEDIATE` transaction and touches one
//!   row; no transaction ever spans two documents.
//! - Documents are validated before write and after read.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::{open_db, open_db_in_memory};
use crate::model::folder::{now_epoch_ms, Folder, FolderId};
use crate::repo::folder_store::{FolderStore, StoreError, StoreResult};
use crate::repo::structure_lock::{StructureGuard, StructureLock};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed folder store. Owns its connection so the store can be
/// shared across request threads.
pub struct SqliteFolderStore {
    conn: Mutex<Connection>,
    structure: StructureLock,
}

impl SqliteFolderStore {
    /// Creates a store from an already migrated connection.
    ///
    /// The structural lock only covers this process's users of the returned
    /// store; use [`SqliteFolderStore::open`] for file databases shared with
    /// other store instances or processes.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        Self::with_structure_lock(conn, StructureLock::in_process())
    }

    /// Opens (and migrates) a database file. Structural mutations are
    /// serialized with every other store opened on the same file through
    /// `<path>.structure.lock`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        Self::with_structure_lock(open_db(path)?, StructureLock::for_database_file(path))
    }

    fn with_structure_lock(conn: Connection, structure: StructureLock) -> StoreResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            structure,
        })
    }

    /// Opens a migrated in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("folder store connection lock poisoned".to_string()))?;
        op(&conn)
    }

    fn edit_children(
        &self,
        parent_id: FolderId,
        edit: impl FnOnce(&mut Folder) -> bool,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let mut parent =
                load_document(&tx, parent_id)?.ok_or(StoreError::NotFound(parent_id))?;
            if edit(&mut parent) {
                parent.touch();
                write_document(&tx, &parent)?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

impl FolderStore for SqliteFolderStore {
    fn get(&self, id: FolderId) -> StoreResult<Option<Folder>> {
        self.with_conn(|conn| load_document(conn, id))
    }

    fn put(&self, folder: &Folder) -> StoreResult<Folder> {
        folder.validate()?;
        self.with_conn(|conn| {
            write_document(conn, folder)?;
            Ok(folder.clone())
        })
    }

    fn delete(&self, id: FolderId) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM folder_documents WHERE id = ?1;",
                [id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    fn add_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()> {
        self.edit_children(parent_id, |parent| parent.children.insert(child_id))
    }

    fn remove_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()> {
        self.edit_children(parent_id, |parent| parent.children.remove(&child_id))
    }

    fn list_all(&self) -> StoreResult<Vec<Folder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT body FROM folder_documents ORDER BY id ASC;")?;
            let mut rows = stmt.query([])?;
            let mut folders = Vec::new();
            while let Some(row) = rows.next()? {
                let body: String = row.get(0)?;
                folders.push(decode_document(&body)?);
            }
            Ok(folders)
        })
    }

    fn lock_structure(&self) -> StoreResult<StructureGuard<'_>> {
        self.structure.acquire()
    }
}

fn load_document(conn: &Connection, id: FolderId) -> StoreResult<Option<Folder>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM folder_documents WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|body| decode_document(&body)).transpose()
}

fn write_document(conn: &Connection, folder: &Folder) -> StoreResult<()> {
    folder.validate()?;
    let body = serde_json::to_string(folder)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode folder {}: {err}", folder.id)))?;
    conn.execute(
        "INSERT INTO folder_documents (id, owner_id, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            body = excluded.body,
            updated_at = excluded.updated_at;",
        params![
            folder.id.to_string(),
            folder.owner_id.to_string(),
            body,
            folder.created_at,
            now_epoch_ms(),
        ],
    )?;
    Ok(())
}

fn decode_document(body: &str) -> StoreResult<Folder> {
    let folder: Folder = serde_json::from_str(body)
        .map_err(|err| StoreError::InvalidData(format!("cannot decode folder body: {err}")))?;
    folder
        .validate()
        .map_err(|err| StoreError::InvalidData(format!("folder {}: {err}", folder.id)))?;
    Ok(folder)
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
