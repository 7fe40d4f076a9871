//! Shared domain types for murmur.
//!
//! Personas (agents), their scheduling settings, action decisions, loop
//! states, inbound mentions, behavior events and the engine configuration,
//! plus the error types shared by every crate.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod action;
pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod mention;
