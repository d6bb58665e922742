//! Hierarchy store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the single-record storage primitives the folder service sequences.
//! - Isolate SQLite and in-memory storage details from hierarchy rules.
//!
//! # Invariants
//! - Every primitive touches exactly one folder document.
//! - Stores enforce `Folder::validate()` on write and make no ordering or
//!   cross-record promises.
//! - Each store owns the structural lock for its graph.

pub mod folder_store;
pub mod memory_store;
pub mod sqlite_store;
pub mod structure_lock;
