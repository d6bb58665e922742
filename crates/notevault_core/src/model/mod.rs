//! Domain model for the folder hierarchy.
//!
//! # Responsibility
//! - Define the persisted folder document and its create/edit inputs.
//!
//! # Invariants
//! - Every folder is identified by a stable `FolderId`.
//! - Deletion is a hard delete; a deleted id is never reused.

pub mod folder;
