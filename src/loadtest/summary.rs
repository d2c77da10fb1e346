//! k6-style terminal summary renderer for load test results.
//!
//! [`render_summary`] is a pure function: it takes the summary and the run
//! configuration and returns a formatted [`String`]. Color coding is applied
//! via the `colored` crate, which respects the global override set by
//! [`colored::control::set_override(false)`] when `--no-color` is active or
//! stdout is piped.

use colored::Colorize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::driver::RunMode;
use crate::loadtest::metrics::MetricsSummary;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Column width for tool names in the per-tool table.
const NAME_WIDTH: usize = 30;

/// Render a k6-style terminal summary.
///
/// # Layout
///
/// ```text
///   mcp-loadtest
///
///   target:     http://localhost:3000/mcp
///   mode:       sequence (3 steps)
///   iterations: 100
///
///   calls_total.............................: 300
///   calls_success...........................: 297
///   calls_failure...........................: 3
///   calls_error_rate........................: 1.0%
///   call_duration...........................: avg=45.2ms  median=41.0ms  p95=120.0ms
///   call_throughput.........................: 15.8 calls/s
///   elapsed.................................: 19.0s
///
///   errors:
///     Request timed out.....................: 3
/// ```
pub fn render_summary(summary: &MetricsSummary, config: &LoadTestConfig, url: &str) -> String {
    let mut lines = Vec::new();

    lines.push(render_header(url, config));

    lines.push(format_metric_row("calls_total", &summary.total.to_string(), PAD_WIDTH));
    lines.push(format_metric_row(
        "calls_success",
        &summary.success.to_string().green().to_string(),
        PAD_WIDTH,
    ));

    let failure_str = if summary.failure > 0 {
        summary.failure.to_string().red().to_string()
    } else {
        summary.failure.to_string()
    };
    lines.push(format_metric_row("calls_failure", &failure_str, PAD_WIDTH));

    let error_rate_pct = summary.error_rate() * 100.0;
    lines.push(format_metric_row(
        "calls_error_rate",
        &colored_rate(error_rate_pct),
        PAD_WIDTH,
    ));

    let latency = format!(
        "avg={:.1}ms  median={:.1}ms  p95={:.1}ms",
        summary.avg_ms, summary.median_ms, summary.p95_ms
    );
    let latency_colored = if summary.p95_ms < 1000.0 {
        latency.green().to_string()
    } else {
        latency.yellow().to_string()
    };
    lines.push(format_metric_row("call_duration", &latency_colored, PAD_WIDTH));

    lines.push(format_metric_row(
        "call_throughput",
        &format!("{:.1} calls/s", summary.throughput).green().to_string(),
        PAD_WIDTH,
    ));
    lines.push(format_metric_row(
        "elapsed",
        &format!("{:.1}s", summary.elapsed_secs),
        PAD_WIDTH,
    ));

    if !summary.errors.is_empty() {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut errors: Vec<_> = summary.errors.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (message, count) in errors {
            lines.push(format_metric_row(
                &format!("    {}", truncate(message, PAD_WIDTH - 6)),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    if !summary.per_tool.is_empty() {
        lines.push(String::new());
        lines.push("  per-tool metrics:".to_string());
        lines.push(String::new());
        lines.push(format!(
            "  {:<NAME_WIDTH$} {:>7} {:>7} {:>7} {:>7} {:>10}",
            "tool", "calls", "ok", "failed", "err%", "avg"
        ));
        lines.push(format!("  {}", "\u{2500}".repeat(72)));

        for (name, tool) in &summary.per_tool {
            let err_pct = if tool.total > 0 {
                tool.failure as f64 / tool.total as f64 * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {:<NAME_WIDTH$} {:>7} {:>7} {:>7} {:>7} {:>10}",
                truncate(name, NAME_WIDTH),
                tool.total,
                tool.success,
                tool.failure,
                colored_rate(err_pct),
                format!("{:.1}ms", tool.avg_ms),
            ));
        }
    }

    lines.join("\n")
}

fn render_header(url: &str, config: &LoadTestConfig) -> String {
    let mode = RunMode::select(!config.sequence.is_empty(), config.settings.run_all);
    let mode_detail = match mode {
        RunMode::Sequence => format!("{mode} ({} steps)", config.sequence.len()),
        _ => mode.to_string(),
    };
    format!(
        "\n  {}\n\n  target:     {}\n  mode:       {}\n  iterations: {}\n  delay:      {}ms\n",
        "mcp-loadtest".bold(),
        url,
        mode_detail,
        config.settings.num_calls,
        config.settings.delay_ms,
    )
}

fn colored_rate(pct: f64) -> String {
    let text = format!("{pct:.1}%");
    if pct > 5.0 {
        text.red().to_string()
    } else if pct > 1.0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

/// Shorten to at most `max` characters, marking the cut with `...`.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}
