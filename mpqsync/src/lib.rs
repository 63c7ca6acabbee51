//! mpqsync - Manifest-driven game asset reconciliation
//!
//! This library keeps a versioned game installation synchronized with a
//! remote manifest of expected files. Some files live loose on disk, others
//! live as named members inside MPQ-style container archives. The library
//! computes what is stale, downloads replacements from mirrored CDNs with
//! retry and backoff, and patches the container archives incrementally so
//! that repeated runs converge without redundant work.
//!
//! # Architecture
//!
//! ```text
//! Manifest ──► Verifier ──► EntryStatus list ──► DownloadPool ──► staging dir
//!                 │                                   │
//!           ArchiveStore                         StateStore
//!                 │                                   │
//!                 └────────── Synchronizer ◄──────────┘
//!                                  │
//!                          updated archives
//! ```

pub mod archive;
pub mod digest;
pub mod download;
pub mod fsutil;
pub mod manifest;
pub mod state;
pub mod sync;
pub mod verify;
