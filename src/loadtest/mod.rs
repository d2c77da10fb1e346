//! Load testing engine for MCP servers.
//!
//! Provides a JSON-RPC tool channel, schema-driven argument synthesis, a
//! multi-step sequence engine with a path-addressed context store, exact
//! latency statistics, and terminal/JSON reporting.

pub mod channel;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod path;
pub mod report;
pub mod sequence;
pub mod summary;
pub mod synth;

#[cfg(test)]
pub(crate) mod testing;
