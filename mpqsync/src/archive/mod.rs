//! Container archive capability.
//!
//! The game stores most of its assets as named members inside MPQ-style
//! container archives. This module defines the capability traits the rest of
//! the library consumes - open, list, read, write, remove - without taking a
//! position on the on-disk block format. Two backends ship with the crate:
//!
//! - [`ZipArchiveStore`]: a real on-disk container built on the `zip` crate,
//!   with atomic rewrite-on-close semantics.
//! - [`MemoryArchiveStore`]: an in-process backend for tests.
//!
//! # Member names
//!
//! Member names use backslash separators regardless of the host filesystem,
//! matching the game client's convention. Callers normalize with
//! [`member_path`] / [`normalize_member`] before every capability call.

mod memory;
mod zip_store;

pub use memory::MemoryArchiveStore;
pub use zip_store::ZipArchiveStore;

use std::path::Path;

use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur during archive capability operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Failed to open an existing archive.
    #[error("failed to open archive {path}: {reason}")]
    Open { path: String, reason: String },

    /// Failed to create a new archive.
    #[error("failed to create archive {path}: {reason}")]
    Create { path: String, reason: String },

    /// The named member does not exist.
    #[error("member not found: {name}")]
    MemberNotFound { name: String },

    /// The named member already exists and replace was not requested.
    #[error("member already exists: {name}")]
    MemberExists { name: String },

    /// Failed to read a member's contents.
    #[error("failed to read member {name}: {reason}")]
    MemberRead { name: String, reason: String },

    /// Failed to write a member.
    #[error("failed to write member {name}: {reason}")]
    MemberWrite { name: String, reason: String },

    /// Failed to remove a member.
    #[error("failed to remove member {name}: {reason}")]
    MemberRemove { name: String, reason: String },

    /// Failed to flush pending writes on close.
    #[error("failed to flush archive {path}: {reason}")]
    Flush { path: String, reason: String },

    /// Failed to delete an archive file.
    #[error("failed to delete archive {path}: {reason}")]
    Delete { path: String, reason: String },
}

/// Mode an archive is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing archive, read operations only.
    ReadOnly,
    /// Fresh archive; any existing file at the path is replaced on close.
    Create,
    /// Existing archive, read and write operations.
    ReadWrite,
}

/// An open container archive.
///
/// Implementations must flush pending writes in [`close`](Archive::close).
/// A handle opened read-only must reject mutation. Single-writer discipline
/// is the caller's responsibility: never open two writable handles to the
/// same archive.
pub trait Archive {
    /// List member names, in archive order.
    fn members(&self) -> Vec<String>;

    /// Whether the named member exists.
    fn has_member(&self, name: &str) -> bool;

    /// Read a member's full contents into memory.
    fn read_member(&mut self, name: &str) -> ArchiveResult<Vec<u8>>;

    /// Write a member. With `replace` set, an existing member of the same
    /// name is overwritten; otherwise it is an error.
    fn write_member(&mut self, name: &str, data: &[u8], replace: bool) -> ArchiveResult<()>;

    /// Remove a member.
    fn remove_member(&mut self, name: &str) -> ArchiveResult<()>;

    /// Flush pending writes and release the handle.
    fn close(self: Box<Self>) -> ArchiveResult<()>;
}

/// Factory for archive handles.
pub trait ArchiveStore {
    /// Open an archive at `path` in the given mode.
    ///
    /// `max_members` is a capacity hint for backends whose formats size
    /// their member index up front; backends may ignore it.
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        max_members: Option<usize>,
    ) -> ArchiveResult<Box<dyn Archive>>;

    /// Whether an archive exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Delete the archive at `path`.
    fn delete(&self, path: &Path) -> ArchiveResult<()>;
}

/// Convert a filesystem-relative path into an archive member name.
pub fn member_path(rel: &Path) -> String {
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("\\");
    normalize_member(&joined)
}

/// Normalize a member name to the backslash convention.
pub fn normalize_member(name: &str) -> String {
    name.replace('/', "\\")
}
