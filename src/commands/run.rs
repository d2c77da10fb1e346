//! `mcp-loadtest run` command implementation.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use mcp_loadtest::loadtest::channel::HttpToolChannel;
use mcp_loadtest::loadtest::config::{discover_config, LoadTestConfig};
use mcp_loadtest::loadtest::driver::LoadTester;
use mcp_loadtest::loadtest::report::{write_report, LoadTestReport};
use mcp_loadtest::loadtest::summary::render_summary;

/// Arguments of the `run` subcommand.
pub struct RunArgs {
    pub url: String,
    pub config_path: Option<PathBuf>,
    pub num_calls: Option<u64>,
    pub delay_ms: Option<u64>,
    pub run_all: bool,
    pub api_key: Option<String>,
    pub no_report: bool,
    pub no_color: bool,
}

/// Execute the `run` command.
///
/// Loads config (explicit path, auto-discovery, or defaults), applies CLI
/// overrides, connects, runs every iteration, prints the summary and writes
/// the JSON report.
pub async fn execute_run(args: RunArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = load_config(args.config_path.as_deref(), &cwd)?;
    config.apply_overrides(args.num_calls, args.delay_ms, args.run_all);
    config.validate()?;

    let channel = HttpToolChannel::new(args.url.clone()).with_api_key(args.api_key);
    let mut tester = LoadTester::connect(channel, config.clone())
        .await
        .with_context(|| format!("Could not start load test against {}", args.url))?;
    eprintln!(
        "Connected to {} ({} tools, {} mode)",
        args.url,
        tester.tools().len(),
        tester.mode()
    );

    let summary = tester.run_load_test().await;

    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&summary, &config, &args.url));

    if !args.no_report {
        let report = LoadTestReport::new(&summary, &config, tester.calls(), &args.url);
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                eprintln!();
                eprintln!("Warning: {e}");
            },
        }
    }

    tester.cleanup().await;
    Ok(())
}

/// Resolve the config: an explicit path must exist; otherwise the nearest
/// `.loadtest/loadtest.toml` is used, falling back to built-in defaults.
fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<LoadTestConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `mcp-loadtest init` to create one.",
                    path.display()
                );
            }
            path.to_path_buf()
        },
        None => match discover_config(cwd) {
            Some(path) => path,
            None => {
                eprintln!("No .loadtest/loadtest.toml found, using default settings");
                return Ok(LoadTestConfig::default());
            },
        },
    };

    eprintln!("Loading config from: {}", path.display());
    LoadTestConfig::load(&path).map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path.display(), e))
}
