//! File and directory node types.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::EntryError;

/// Type of file system node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryKind {
    /// Regular file (or a symlink when links are not followed).
    File,
    /// Directory.
    Directory,
    /// Entry that could not be read or must not be descended into.
    Inaccessible,
}

impl EntryKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Check if this entry could not be read.
    pub fn is_inaccessible(&self) -> bool {
        matches!(self, EntryKind::Inaccessible)
    }
}

/// Point-in-time copy of one node of the tree store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    /// Absolute path; the node's identity.
    pub path: PathBuf,

    /// Final path component.
    pub name: CompactString,

    /// Node type.
    pub kind: EntryKind,

    /// Bytes for files; sum of known descendants for directories.
    pub size_bytes: u64,

    /// Every descendant has been enumerated (or the file was stat'd).
    pub scan_complete: bool,

    /// Children discovered so far, in discovery order.
    pub children: Vec<PathBuf>,

    /// Child count reported by the precount pass, if it reached this node.
    pub child_count_hint: Option<u64>,

    /// Error marker; the node stays in the tree with a frozen size.
    pub error: Option<EntryError>,
}

impl FsEntry {
    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Number of children known so far.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Node state carried by every node-level event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size_bytes: u64,
    pub scan_complete: bool,
    pub error: Option<EntryError>,
}

/// Display name for a path: its last component, or the whole path for roots.
pub fn display_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}
