//! Batch operations.
//!
//! Each task is a method on [`MediaEngine`](crate::MediaEngine) built from the same pieces:
//! scan, extract identifiers, index, select, apply guarded actions and log the tally.

mod books;
mod catalog;
mod covers;
mod ed2k;
mod organize;
mod posters;
mod rename;
mod subtitles;

pub use organize::{MediaKind, OrganizeLayout};
pub use rename::FolderTag;
