//! Load test driver.
//!
//! [`LoadTester`] owns a connected [`ToolChannel`] and runs `num_calls`
//! iterations in one of three modes: the configured sequence, every tool in
//! turn (run-all), or one random tool. Every tool invocation goes through
//! [`ToolSession::call_tool`], which times it, records it in the metrics and
//! call log, and applies the inter-call delay.

use std::fmt;
use std::time::{Duration, Instant};

use rand::RngExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::loadtest::channel::{ToolCallResult, ToolChannel, ToolDescriptor};
use crate::loadtest::config::{LoadTestConfig, Settings};
use crate::loadtest::context::ContextStore;
use crate::loadtest::error::{IterationError, LoadTestError, McpError, SequenceError};
use crate::loadtest::metrics::{duration_ms, CallLog, CallRecord, CallSample, MetricsAggregator, MetricsSummary};
use crate::loadtest::sequence::SequenceStep;
use crate::loadtest::synth::ParameterSynthesizer;

/// Which loop body an iteration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Execute the configured sequence.
    Sequence,
    /// Call every discovered tool once, in discovery order.
    RunAll,
    /// Call one uniformly chosen tool.
    Random,
}

impl RunMode {
    /// Sequence wins over run-all, run-all over random.
    pub fn select(has_sequence: bool, run_all: bool) -> Self {
        if has_sequence {
            Self::Sequence
        } else if run_all {
            Self::RunAll
        } else {
            Self::Random
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequence => "sequence",
            Self::RunAll => "run-all",
            Self::Random => "random",
        })
    }
}

/// A connected channel plus everything needed to invoke and account for calls.
pub struct ToolSession<C> {
    channel: C,
    tools: Vec<ToolDescriptor>,
    synth: ParameterSynthesizer,
    metrics: MetricsAggregator,
    calls: CallLog,
    delay: Duration,
}

impl<C: ToolChannel> ToolSession<C> {
    /// Wraps an already connected channel and its discovered tools.
    pub fn new(channel: C, tools: Vec<ToolDescriptor>, synth: ParameterSynthesizer, delay_ms: u64) -> Self {
        Self {
            channel,
            tools,
            synth,
            metrics: MetricsAggregator::new(),
            calls: CallLog::new(),
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Discovered tools, in server order.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Looks up a discovered tool by name.
    pub fn find_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Argument synthesizer in use.
    pub fn synthesizer(&self) -> &ParameterSynthesizer {
        &self.synth
    }

    /// Accumulated call metrics.
    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    /// Every call attempted so far.
    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    /// Invoke a tool, recording the outcome.
    ///
    /// A result flagged `isError` comes back as [`McpError::Tool`]. The
    /// configured delay is applied after the call whatever its outcome.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let start = Instant::now();
        let outcome = self
            .channel
            .call_tool(name, arguments.clone())
            .await
            .and_then(ToolCallResult::into_result);
        let elapsed = duration_ms(start.elapsed());

        let (result, error) = match &outcome {
            Ok(res) => {
                debug!(tool = %name, duration_ms = elapsed, "tool call succeeded");
                self.metrics.record(CallSample::success(name, elapsed));
                (serde_json::to_value(res).ok(), None)
            },
            Err(err) => {
                warn!(
                    tool = %name,
                    duration_ms = elapsed,
                    category = err.error_category(),
                    error = %err,
                    "tool call failed"
                );
                self.metrics.record(CallSample::failure(name, elapsed, err));
                (None, Some(err.to_string()))
            },
        };
        self.calls.push(CallRecord {
            tool_name: name.to_string(),
            args: arguments,
            result,
            error,
            duration_ms: elapsed,
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        outcome
    }

    /// Account for a step that names a tool the server does not have.
    pub fn record_unknown_tool(&mut self, name: &str, arguments: Value) {
        let message = format!("Unknown tool: {name}");
        self.metrics.record(CallSample::failure(name, 0.0, &message));
        self.calls.push(CallRecord {
            tool_name: name.to_string(),
            args: arguments,
            result: None,
            error: Some(message),
            duration_ms: 0.0,
        });
    }

    /// Call one uniformly chosen tool with synthesized arguments.
    pub async fn call_random(&mut self) -> Result<(), IterationError> {
        if self.tools.is_empty() {
            return Err(IterationError::NoTools);
        }
        let index = rand::rng().random_range(0..self.tools.len());
        let tool = self.tools[index].clone();
        let arguments = Value::Object(self.synth.generate(&tool.input_schema));
        self.call_tool(&tool.name, arguments)
            .await
            .map(|_| ())
            .map_err(|source| IterationError::Call {
                tool: tool.name,
                source,
            })
    }

    /// Call every tool once in discovery order. Failures are recorded and
    /// the loop moves on; returns the number of failed calls.
    pub async fn call_all(&mut self) -> Result<usize, IterationError> {
        if self.tools.is_empty() {
            return Err(IterationError::NoTools);
        }
        let mut failed = 0;
        for tool in self.tools.clone() {
            let arguments = Value::Object(self.synth.generate(&tool.input_schema));
            if self.call_tool(&tool.name, arguments).await.is_err() {
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Close the underlying channel.
    pub async fn close(&mut self) -> Result<(), McpError> {
        self.channel.close().await
    }
}

/// Connected load tester.
///
/// # Example
///
/// ```no_run
/// use mcp_loadtest::loadtest::channel::HttpToolChannel;
/// use mcp_loadtest::loadtest::config::LoadTestConfig;
/// use mcp_loadtest::loadtest::driver::LoadTester;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = HttpToolChannel::new("http://localhost:3000/mcp");
/// let mut tester = LoadTester::connect(channel, LoadTestConfig::default()).await?;
/// let summary = tester.run_load_test().await;
/// println!("{} calls, {} failed", summary.total, summary.failure);
/// tester.cleanup().await;
/// # Ok(())
/// # }
/// ```
pub struct LoadTester<C> {
    session: ToolSession<C>,
    settings: Settings,
    sequence: Vec<SequenceStep>,
    context: ContextStore,
}

impl<C: ToolChannel> LoadTester<C> {
    /// Connect the channel and discover its tools.
    ///
    /// Either failure is fatal and returned as [`LoadTestError::Connect`].
    pub async fn connect(mut channel: C, config: LoadTestConfig) -> Result<Self, LoadTestError> {
        channel
            .connect()
            .await
            .map_err(|source| LoadTestError::Connect { source })?;
        let tools = channel
            .list_tools()
            .await
            .map_err(|source| LoadTestError::Connect { source })?;
        info!(tools = tools.len(), "connected and discovered tools");

        let LoadTestConfig {
            settings,
            mock,
            sequence,
        } = config;
        Ok(Self {
            session: ToolSession::new(channel, tools, ParameterSynthesizer::new(mock), settings.delay_ms),
            settings,
            sequence,
            context: ContextStore::new(),
        })
    }

    /// Mode used for every iteration of [`run_load_test`](Self::run_load_test).
    pub fn mode(&self) -> RunMode {
        RunMode::select(!self.sequence.is_empty(), self.settings.run_all)
    }

    /// Discovered tools.
    pub fn tools(&self) -> &[ToolDescriptor] {
        self.session.tools()
    }

    /// Every call attempted so far.
    pub fn calls(&self) -> &CallLog {
        self.session.calls()
    }

    /// The run-wide context store used in sequence mode.
    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Current statistics.
    pub fn summary(&self) -> MetricsSummary {
        self.session.metrics().summarize()
    }

    /// Run `steps` once against a fresh context store and return it.
    pub async fn execute_sequence(&mut self, steps: &[SequenceStep]) -> Result<ContextStore, SequenceError> {
        self.session.execute_sequence(steps).await
    }

    /// Run `num_calls` iterations and return the summary.
    ///
    /// Iteration failures are logged and never stop the run. In sequence
    /// mode the context store carries over between iterations.
    pub async fn run_load_test(&mut self) -> MetricsSummary {
        let mode = self.mode();
        info!(
            mode = %mode,
            iterations = self.settings.num_calls,
            delay_ms = self.settings.delay_ms,
            "starting load test"
        );

        for iteration in 1..=self.settings.num_calls {
            let outcome = match mode {
                RunMode::Sequence => self
                    .session
                    .execute_sequence_with(&self.sequence, &mut self.context)
                    .await
                    .map_err(IterationError::from),
                RunMode::RunAll => self.session.call_all().await.map(|failed| {
                    if failed > 0 {
                        debug!(iteration, failed, "run-all iteration had failures");
                    }
                }),
                RunMode::Random => self.session.call_random().await,
            };
            if let Err(err) = outcome {
                warn!(iteration, error = %err, "iteration failed");
            }
        }

        let summary = self.summary();
        info!(
            total = summary.total,
            success = summary.success,
            failure = summary.failure,
            avg_ms = summary.avg_ms,
            median_ms = summary.median_ms,
            p95_ms = summary.p95_ms,
            throughput = summary.throughput,
            "load test complete"
        );
        summary
    }

    /// Close the channel and drop the run-wide context.
    pub async fn cleanup(&mut self) {
        self.context.clear();
        if let Err(err) = self.session.close().await {
            warn!(error = %err, "failed to close session cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::sequence::ContextTransformStep;
    use crate::loadtest::testing::ScriptedChannel;
    use serde_json::json;

    fn config(num_calls: u64, run_all: bool, sequence: Vec<SequenceStep>) -> LoadTestConfig {
        LoadTestConfig {
            settings: Settings {
                num_calls,
                delay_ms: 0,
                run_all,
            },
            sequence,
            ..LoadTestConfig::default()
        }
    }

    #[test]
    fn test_mode_precedence() {
        assert_eq!(RunMode::select(true, true), RunMode::Sequence);
        assert_eq!(RunMode::select(false, true), RunMode::RunAll);
        assert_eq!(RunMode::select(false, false), RunMode::Random);
    }

    #[tokio::test]
    async fn test_always_failing_channel_still_completes() {
        let channel = ScriptedChannel::new().tool("broken", |_| {
            Err(McpError::Connection {
                message: "refused".to_string(),
            })
        });
        let mut tester = LoadTester::connect(channel, config(5, false, vec![])).await.unwrap();

        let summary = tester.run_load_test().await;
        assert_eq!(summary.total, 5);
        assert_eq!(summary.success, 0);
        assert_eq!(summary.failure, 5);
        assert_eq!(summary.errors.get("Connection error: refused"), Some(&5));
        assert_eq!(tester.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_run_all_calls_every_tool_in_order() {
        let channel = ScriptedChannel::new()
            .tool("a", |_| Ok(ToolCallResult::text("ok")))
            .tool("b", |_| Err(McpError::Timeout))
            .tool("c", |_| Ok(ToolCallResult::text("ok")));
        let calls = channel.calls.clone();
        let mut tester = LoadTester::connect(channel, config(2, true, vec![])).await.unwrap();
        assert_eq!(tester.mode(), RunMode::RunAll);

        let summary = tester.run_load_test().await;
        assert_eq!(summary.total, 6);
        assert_eq!(summary.failure, 2);
        let names: Vec<String> = calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_random_mode_synthesizes_arguments() {
        let channel = ScriptedChannel::new().tool_with_schema(
            "echo",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            |_| Ok(ToolCallResult::text("ok")),
        );
        let calls = channel.calls.clone();
        let mut tester = LoadTester::connect(channel, config(3, false, vec![])).await.unwrap();

        let summary = tester.run_load_test().await;
        assert_eq!(summary.success, 3);
        for (_, args) in calls.lock().unwrap().iter() {
            assert!(args["text"].is_string());
        }
    }

    #[tokio::test]
    async fn test_unbounded_number_range_does_not_abort_run() {
        let channel = ScriptedChannel::new().tool_with_schema(
            "measure",
            json!({"type": "object", "properties": {"x": {"type": "number"}}}),
            |_| Ok(ToolCallResult::text("ok")),
        );
        let mut config = config(2, false, vec![]);
        config.mock.number_max = f64::INFINITY;
        let mut tester = LoadTester::connect(channel, config).await.unwrap();

        let summary = tester.run_load_test().await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.success, 2);
    }

    #[tokio::test]
    async fn test_call_log_keeps_result_envelope() {
        let channel = ScriptedChannel::new()
            .tool("ok", |_| Ok(ToolCallResult::text("done")))
            .tool("bad", |_| Ok(ToolCallResult::error("boom")));
        let mut tester = LoadTester::connect(channel, config(1, true, vec![])).await.unwrap();
        tester.run_load_test().await;

        let records = tester.calls().records();
        assert_eq!(
            records[0].result,
            Some(json!({"content": [{"type": "text", "text": "done"}], "isError": false}))
        );
        assert_eq!(records[1].result, None);
        assert_eq!(records[1].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_no_tools_records_nothing() {
        let mut tester = LoadTester::connect(ScriptedChannel::new(), config(3, false, vec![]))
            .await
            .unwrap();
        let summary = tester.run_load_test().await;
        assert_eq!(summary.total, 0);
    }

    #[tokio::test]
    async fn test_sequence_context_spans_iterations() {
        let channel = ScriptedChannel::new().tool("counter", |args| {
            let n = args.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(ToolCallResult::text(json!({"n": n + 1}).to_string()))
        });
        let sequence = vec![SequenceStep::tool_call("counter")
            .with_static("n", json!(0))
            .with_input("n", json!("$.n"))
            .with_output("n", "$.n")
            .into()];
        let mut tester = LoadTester::connect(channel, config(3, false, sequence)).await.unwrap();
        tester.context.insert("n", json!(0));

        let summary = tester.run_load_test().await;
        assert_eq!(summary.success, 3);
        assert_eq!(tester.context().get("n"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_sequence_failures_do_not_stop_run() {
        let channel = ScriptedChannel::new().tool("bad", |_| Ok(ToolCallResult::error("boom")));
        let sequence = vec![SequenceStep::tool_call("bad").into()];
        let mut tester = LoadTester::connect(channel, config(4, true, sequence)).await.unwrap();

        let summary = tester.run_load_test().await;
        assert_eq!(summary.total, 4);
        assert_eq!(summary.errors.get("boom"), Some(&4));
    }

    #[tokio::test]
    async fn test_execute_sequence_uses_fresh_store() {
        let channel = ScriptedChannel::new();
        let mut tester = LoadTester::connect(channel, config(1, false, vec![])).await.unwrap();
        tester.context.insert("a", json!(1));

        let steps: Vec<SequenceStep> = vec![ContextTransformStep {
            input_mapping: serde_json::from_value(json!({"b": "$.a"})).unwrap(),
            path_args: Default::default(),
        }
        .into()];
        let err = tester.execute_sequence(&steps).await.unwrap_err();
        assert!(matches!(err, SequenceError::Path(_)));
        assert_eq!(tester.context().get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let channel = ScriptedChannel::new().failing_connect();
        let err = LoadTester::connect(channel, LoadTestConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LoadTestError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_closes_channel_and_clears_context() {
        let channel = ScriptedChannel::new();
        let closed = channel.closed.clone();
        let mut tester = LoadTester::connect(channel, LoadTestConfig::default()).await.unwrap();
        tester.context.insert("k", json!(true));

        tester.cleanup().await;
        assert!(tester.context().is_empty());
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
