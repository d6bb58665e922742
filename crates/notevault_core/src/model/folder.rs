//! Folder domain model.
//!
//! # Responsibility
//! - Define the persisted folder document shared by store and services.
//! - Own model-level validation (name length, tag shape, root flag).
//!
//! # Invariants
//! - `id` and `owner_id` never change after creation.
//! - `is_root == parent_id.is_none()`.
//! - `children` is a denormalized back-reference: it must equal the set of
//!   folders whose `parent_id` points at this folder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable folder identifier.
pub type FolderId = Uuid;
/// Identifier of the principal owning a folder.
pub type OwnerId = Uuid;
/// Identifier of a note contained in a folder.
pub type NoteId = Uuid;

pub const FOLDER_NAME_MIN_CHARS: usize = 3;
pub const FOLDER_NAME_MAX_CHARS: usize = 30;

/// Model-level validation failures for folder documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderValidationError {
    /// Name length (after trim) is outside `3..=30` characters.
    NameLength { chars: usize },
    /// A tag is blank after trim.
    BlankTag,
    /// `is_root` disagrees with `parent_id`.
    RootFlagMismatch { is_root: bool, has_parent: bool },
    /// Folder lists itself as parent or child.
    SelfReference(FolderId),
}

impl Display for FolderValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameLength { chars } => write!(
                f,
                "folder name must be {FOLDER_NAME_MIN_CHARS}..={FOLDER_NAME_MAX_CHARS} chars, got {chars}"
            ),
            Self::BlankTag => write!(f, "folder tags must not be blank"),
            Self::RootFlagMismatch {
                is_root,
                has_parent,
            } => write!(
                f,
                "folder root flag mismatch: is_root={is_root} has_parent={has_parent}"
            ),
            Self::SelfReference(id) => write!(f, "folder references itself: {id}"),
        }
    }
}

impl Error for FolderValidationError {}

/// Persisted folder document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `None` marks a root folder.
    pub parent_id: Option<FolderId>,
    #[serde(default)]
    pub children: BTreeSet<FolderId>,
    #[serde(default)]
    pub note_refs: BTreeSet<NoteId>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub is_root: bool,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl Folder {
    /// Builds a fresh folder document from create input with a new id.
    ///
    /// The returned folder has no children and no note refs; `is_root`
    /// follows `parent_id`.
    pub fn from_new(input: NewFolder) -> Self {
        let now = now_epoch_ms();
        Self {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name.trim().to_string(),
            description: input.description,
            is_root: input.parent_id.is_none(),
            parent_id: input.parent_id,
            children: BTreeSet::new(),
            note_refs: BTreeSet::new(),
            tags: normalize_tags(input.tags),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks model-level constraints before persistence.
    pub fn validate(&self) -> Result<(), FolderValidationError> {
        let chars = self.name.trim().chars().count();
        if !(FOLDER_NAME_MIN_CHARS..=FOLDER_NAME_MAX_CHARS).contains(&chars) {
            return Err(FolderValidationError::NameLength { chars });
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(FolderValidationError::BlankTag);
        }
        if self.is_root != self.parent_id.is_none() {
            return Err(FolderValidationError::RootFlagMismatch {
                is_root: self.is_root,
                has_parent: self.parent_id.is_some(),
            });
        }
        if self.parent_id == Some(self.id) || self.children.contains(&self.id) {
            return Err(FolderValidationError::SelfReference(self.id));
        }
        Ok(())
    }

    /// Points this folder at a new parent (or makes it a root) and keeps
    /// `is_root` in sync.
    pub fn set_parent(&mut self, parent_id: Option<FolderId>) {
        self.parent_id = parent_id;
        self.is_root = parent_id.is_none();
        self.touch();
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = now_epoch_ms();
    }

    /// Applies field edits. Structural fields are never touched here.
    pub fn apply_patch(&mut self, patch: FolderPatch) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        self.touch();
    }
}

/// Create input for a folder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewFolder {
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
    /// Existing parent. `None` creates a root folder.
    pub parent_id: Option<FolderId>,
    pub tags: Vec<String>,
}

impl NewFolder {
    /// Convenience constructor for a root folder with no description or tags.
    pub fn root(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Convenience constructor for a folder under `parent_id`.
    pub fn child(owner_id: OwnerId, name: impl Into<String>, parent_id: FolderId) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::root(owner_id, name)
        }
    }
}

/// Field edit input. `None` leaves a field unchanged; `description:
/// Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FolderPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

fn normalize_tags(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter().map(|tag| tag.trim().to_string()).collect()
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
