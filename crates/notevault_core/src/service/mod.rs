//! Folder hierarchy use-case services.
//!
//! # Responsibility
//! - Validate parent assignments before any write (`cycle_guard`).
//! - Sequence multi-document structural writes (`folder_service`).
//! - Detect and repair inconsistent back-references (`reconcile`).
//!
//! # Invariants
//! - Services never bypass store validation.
//! - Services remain storage-agnostic through the `FolderStore` trait.

pub mod cycle_guard;
pub mod error;
pub mod folder_service;
pub mod reconcile;
pub mod traversal;
