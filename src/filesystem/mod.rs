// src/filesystem/mod.rs

//! Filesystem operations for revkeep.
//!
//! Unlike a content-addressable store, revkeep keeps every retained
//! revision of a path under its own numbered filename on disk — see
//! [`revstore`] — so a revision can be read back by number without
//! reconstructing it from a hash index.

pub mod path;
pub mod revstore;

pub use revstore::{RevisionHandle, RevisionStore};
