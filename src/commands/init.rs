//! `mcp-loadtest init` command implementation.

use anyhow::Result;
use std::fmt::Write as _;

use mcp_loadtest::loadtest::channel::{HttpToolChannel, ToolChannel, ToolDescriptor};
use mcp_loadtest::loadtest::config::config_path;

/// Execute the `init` command.
///
/// Creates `.loadtest/loadtest.toml` with sensible defaults. If a server URL
/// is provided, connects to discover tools and adds a commented sequence
/// skeleton naming them.
pub async fn execute_init(url: Option<String>, api_key: Option<String>, force: bool) -> Result<()> {
    let config_path = config_path(&std::env::current_dir()?);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    let content = match url {
        Some(server_url) => {
            eprintln!("Discovering tools at {server_url}...");
            match discover_tools(&server_url, api_key).await {
                Ok(tools) => generate_discovered_template(&server_url, &tools),
                Err(e) => {
                    eprintln!(
                        "Warning: Could not discover tools: {e}\n\
                         Generating default template instead."
                    );
                    generate_default_template()
                },
            }
        },
        None => generate_default_template(),
    };

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, &content)?;
    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize your load test.");

    Ok(())
}

async fn discover_tools(url: &str, api_key: Option<String>) -> Result<Vec<ToolDescriptor>> {
    let mut channel = HttpToolChannel::new(url).with_api_key(api_key);
    channel.connect().await?;
    let tools = channel.list_tools().await;
    let _ = channel.close().await;
    Ok(tools?)
}

/// Generate a default TOML template without server discovery.
fn generate_default_template() -> String {
    let mut out = String::from(TEMPLATE_HEADER);
    out.push_str(
        r#"
# Uncomment to run a multi-step workflow on every iteration instead of
# calling tools at random.
#
# [[sequence]]
# type = "tool_call"
# tool = "create_item"
# static_inputs = { kind = "demo" }
# output_mapping = { item_id = "$.id" }
#
# [[sequence]]
# type = "tool_call"
# tool = "get_item"
# input_mapping = { id = "$.item_id" }
# output_type = "text"
"#,
    );
    out
}

/// Generate a template whose sequence skeleton names the discovered tools.
fn generate_discovered_template(url: &str, tools: &[ToolDescriptor]) -> String {
    let mut out = String::from(TEMPLATE_HEADER);
    let _ = writeln!(out);
    let _ = writeln!(out, "# Discovered {} tool(s) at {url}.", tools.len());
    let _ = writeln!(out, "# Uncomment and wire up steps to run them as a sequence.");
    for tool in tools {
        let _ = writeln!(out, "#");
        let _ = writeln!(out, "# [[sequence]]");
        let _ = writeln!(out, "# type = \"tool_call\"");
        let _ = writeln!(out, "# tool = {:?}", tool.name);
        let required = tool.required_fields();
        if !required.is_empty() {
            let _ = writeln!(out, "# required: {}", required.join(", "));
        }
    }
    out
}

const TEMPLATE_HEADER: &str = r#"# Load test configuration for mcp-loadtest

[settings]
# Iterations to run
num_calls = 100

# Wait after every tool call (ms)
delay_ms = 100

# Call every tool on each iteration instead of one random tool
run_all = false

[mock]
# Shape of synthesized arguments
string_length = 8
array_length = 2
number_min = 0
number_max = 1000

# Fixed values for specific argument names
# [mock.fields]
# email = "load@example.com"
"#;
