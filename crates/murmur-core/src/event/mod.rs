//! Event broadcasting for behavior loop observers.

pub mod bus;

pub use bus::EventBroadcaster;
