//! Behavior engine and collaborator trait definitions for murmur.
//!
//! This crate defines the "ports" (repository, platform and generator traits)
//! that the infrastructure layer implements, plus the engine built on them:
//! action selection, rate limiting, the content gate, mention dedup, the
//! per-agent behavior loop and the scheduler that owns those loops. It depends
//! only on `murmur-types` -- never on `murmur-infra` or any database/IO crate.

pub mod behavior;
pub mod control;
pub mod event;
pub mod generator;
pub mod platform;
pub mod repository;
pub mod scheduler;

#[cfg(test)]
mod testing;
