//! Core folder hierarchy engine for NoteVault.
//! This crate is the single source of truth for folder tree invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget, LoggingError,
};
pub use model::folder::{
    Folder, FolderId, FolderPatch, FolderValidationError, NewFolder, NoteId, OwnerId,
};
pub use repo::folder_store::{FolderStore, StoreError, StoreResult};
pub use repo::memory_store::{MemoryFolderStore, StoreOp};
pub use repo::sqlite_store::SqliteFolderStore;
pub use repo::structure_lock::{StructureGuard, StructureLock};
pub use service::cycle_guard::CycleGuard;
pub use service::error::{CycleKind, FolderServiceError, WriteStep};
pub use service::folder_service::{FolderService, FolderServiceResult};
pub use service::reconcile::{HierarchyIssue, RepairReport};
pub use service::traversal::HierarchyLimits;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
