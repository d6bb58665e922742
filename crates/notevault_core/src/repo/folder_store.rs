//! Folder store contract shared by all storage backends.
//!
//! # Responsibility
//! - Expose `get`, `put`, `delete`, `add_child`, `remove_child` over folder
//!   documents, plus a full listing for read accessors and reconciliation.
//! - Define the storage error taxonomy.
//!
//! # Invariants
//! - Each call is a best-effort-atomic write of one document.
//! - `add_child` / `remove_child` behave as set insert / set remove and are
//!   idempotent.
//! - The store holds no hierarchy rules: it happily persists dangling or
//!   cyclic references.
//! - `lock_structure` is the only cross-call coordination a store offers.

use crate::db::DbError;
use crate::model::folder::{Folder, FolderId, FolderValidationError};
use crate::repo::structure_lock::StructureGuard;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by folder store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from folder store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target folder document does not exist.
    NotFound(FolderId),
    /// Document failed model validation before write.
    Validation(FolderValidationError),
    /// Persisted data cannot be decoded into a valid folder.
    InvalidData(String),
    /// Backend refused or lost the write.
    Unavailable(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "folder document not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid folder document: {message}"),
            Self::Unavailable(message) => write!(f, "folder store unavailable: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "folder store requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<FolderValidationError> for StoreError {
    fn from(value: FolderValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Storage primitives over folder documents.
pub trait FolderStore {
    /// Loads one folder by id.
    fn get(&self, id: FolderId) -> StoreResult<Option<Folder>>;
    /// Inserts or replaces one folder document and returns the committed copy.
    fn put(&self, folder: &Folder) -> StoreResult<Folder>;
    /// Deletes one folder document. Returns whether a document was removed.
    fn delete(&self, id: FolderId) -> StoreResult<bool>;
    /// Inserts `child_id` into the `children` set of `parent_id`.
    fn add_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()>;
    /// Removes `child_id` from the `children` set of `parent_id`.
    fn remove_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()>;
    /// Lists every folder document ordered by id.
    fn list_all(&self) -> StoreResult<Vec<Folder>>;
    /// Takes the structural mutation lock shared by every user of this
    /// store's graph.
    fn lock_structure(&self) -> StoreResult<StructureGuard<'_>>;
}

impl<S: FolderStore + ?Sized> FolderStore for std::sync::Arc<S> {
    fn get(&self, id: FolderId) -> StoreResult<Option<Folder>> {
        (**self).get(id)
    }

    fn put(&self, folder: &Folder) -> StoreResult<Folder> {
        (**self).put(folder)
    }

    fn delete(&self, id: FolderId) -> StoreResult<bool> {
        (**self).delete(id)
    }

    fn add_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()> {
        (**self).add_child(parent_id, child_id)
    }

    fn remove_child(&self, parent_id: FolderId, child_id: FolderId) -> StoreResult<()> {
        (**self).remove_child(parent_id, child_id)
    }

    fn list_all(&self) -> StoreResult<Vec<Folder>> {
        (**self).list_all()
    }

    fn lock_structure(&self) -> StoreResult<StructureGuard<'_>> {
        (**self).lock_structure()
    }
}
