//! mcp-loadtest: load testing for MCP tool servers.
//!
//! Connects to a server over Streamable HTTP, discovers its tools, and calls
//! them repeatedly (at random, all in turn, or as a declared multi-step
//! sequence) while collecting latency and failure statistics.
//!
//! The engine lives in [`loadtest`]; the `mcp-loadtest` binary is a thin CLI
//! over it.

pub mod loadtest;
