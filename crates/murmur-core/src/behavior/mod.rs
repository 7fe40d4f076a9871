//! The per-agent behavior engine.
//!
//! - `selector`: pure next-action decision
//! - `clock`: wall clock, optionally anchored to tokio time
//! - `command`: manual engagement commands sent into a loop
//! - `ratelimit`: per-agent sliding rate windows
//! - `gate`: content policy check before publish
//! - `dedup`: mention filtering against answered ids
//! - `backoff`: escalating error sleep and circuit breaker
//! - `timeout`: budgets around collaborator calls
//! - `runner`: the loop itself

pub mod backoff;
pub mod clock;
pub mod command;
pub mod dedup;
pub mod gate;
pub mod ratelimit;
pub mod runner;
pub mod selector;
pub mod timeout;

pub use runner::{BehaviorLoop, LoopContext};
