// src/db/mod.rs

//! The metadata index: SQLite-backed storage for everything about a
//! revision except its bytes (those live in [`crate::filesystem`]).

pub mod models;
pub mod paths;
pub mod schema;

pub use models::*;
