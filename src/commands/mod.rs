//! `mcp-loadtest` CLI subcommands.
//!
//! Provides `run` (execute a load test) and `init` (generate starter config).

mod init;
mod run;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

/// Load test commands for MCP servers.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against an MCP server
    ///
    /// Uses the settings and sequence in .loadtest/loadtest.toml (or a custom
    /// config path). Reports results to the terminal and writes a JSON report
    /// to .loadtest/reports/.
    Run {
        /// Target MCP server URL
        url: String,

        /// Path to config file (default: auto-discover .loadtest/loadtest.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of iterations (overrides config)
        #[arg(long)]
        num_calls: Option<u64>,

        /// Delay after every tool call in milliseconds (overrides config)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Call every tool on each iteration (ignored when a sequence is configured)
        #[arg(long)]
        run_all: bool,

        /// API key sent as a bearer token and X-API-Key header
        #[arg(long, env = "MCP_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Disable JSON report output
        #[arg(long)]
        no_report: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Generate a starter loadtest config file
    ///
    /// Creates .loadtest/loadtest.toml with sensible defaults. If a server URL
    /// is provided, discovers available tools and adds a commented sequence
    /// skeleton naming them.
    Init {
        /// Optional server URL for tool discovery
        url: Option<String>,

        /// API key used for discovery
        #[arg(long, env = "MCP_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        match self {
            Command::Run {
                url,
                config,
                num_calls,
                delay_ms,
                run_all,
                api_key,
                no_report,
                no_color,
            } => runtime.block_on(run::execute_run(run::RunArgs {
                url,
                config_path: config,
                num_calls,
                delay_ms,
                run_all,
                api_key,
                no_report,
                no_color,
            })),
            Command::Init {
                url,
                api_key,
                force,
            } => runtime.block_on(init::execute_init(url, api_key, force)),
        }
    }
}
