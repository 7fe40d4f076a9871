//! Observability setup for murmur: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
