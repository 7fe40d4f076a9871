//! Infrastructure layer for murmur.
//!
//! Implementations of the collaborator traits defined in `murmur-core`:
//! SQLite persona storage, a dry-run platform connector and a template
//! content generator. Also resolves the data directory and loads
//! `config.toml`.

pub mod config;
pub mod generator;
pub mod platform;
pub mod sqlite;
