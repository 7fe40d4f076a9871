//! SQLite storage layer.

pub mod character;
pub mod pool;
