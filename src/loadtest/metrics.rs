//! Call outcome aggregation and summary statistics.
//!
//! [`MetricsAggregator`] ingests one [`CallSample`] per attempted tool call and
//! turns the accumulated state into a [`MetricsSummary`] on demand. Latencies
//! are kept as exact millisecond values so median and p95 are computed from the
//! sorted sample set rather than approximated.
//!
//! [`CallLog`] is the companion append-only record of every call with its
//! arguments and outcome, used for the JSON report.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Converts a wall-clock duration to fractional milliseconds.
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// A single call outcome, passed to [`MetricsAggregator::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallSample {
    /// Tool the call targeted (or the step's tool name if it was unknown).
    pub tool_name: String,
    /// Call latency in milliseconds.
    pub duration_ms: f64,
    /// `None` for success, `Some(message)` for failure.
    pub error: Option<String>,
}

impl CallSample {
    /// Create a success sample.
    pub fn success(tool_name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            tool_name: tool_name.into(),
            duration_ms,
            error: None,
        }
    }

    /// Create a failure sample. The error's display string becomes its tally key.
    pub fn failure(tool_name: impl Into<String>, duration_ms: f64, err: &dyn fmt::Display) -> Self {
        Self {
            tool_name: tool_name.into(),
            duration_ms,
            error: Some(err.to_string()),
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-tool running counters.
#[derive(Debug, Clone, Default)]
struct ToolMetrics {
    total: u64,
    success: u64,
    failure: u64,
    response_times: Vec<f64>,
}

/// Summary statistics for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Calls attempted against this tool.
    pub total: u64,
    /// Calls that succeeded.
    pub success: u64,
    /// Calls that failed.
    pub failure: u64,
    /// Mean latency of this tool's calls (milliseconds).
    pub avg_ms: f64,
}

/// Point-in-time statistics computed from all recorded samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Calls attempted.
    pub total: u64,
    /// Calls that succeeded.
    pub success: u64,
    /// Calls that failed, at the transport or tool level.
    pub failure: u64,
    /// Arithmetic mean latency (milliseconds).
    pub avg_ms: f64,
    /// Median latency (milliseconds).
    pub median_ms: f64,
    /// 95th percentile latency, nearest-rank (milliseconds).
    pub p95_ms: f64,
    /// Calls per second of wall-clock time.
    pub throughput: f64,
    /// Wall-clock seconds from aggregator start to the last recorded call.
    pub elapsed_secs: f64,
    /// Failure counts keyed by error message.
    pub errors: BTreeMap<String, u64>,
    /// Per-tool breakdown, keyed by tool name.
    pub per_tool: BTreeMap<String, ToolSummary>,
}

impl MetricsSummary {
    /// Fraction of calls that failed (0.0..=1.0).
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failure as f64 / self.total as f64
        }
    }
}

/// Single-owner metrics state. No internal locking: one writer records, the
/// same owner summarizes.
///
/// # Example
///
/// ```
/// use mcp_loadtest::loadtest::metrics::{CallSample, MetricsAggregator};
///
/// let mut metrics = MetricsAggregator::new();
/// for ms in [100.0, 200.0, 300.0, 400.0] {
///     metrics.record(CallSample::success("echo", ms));
/// }
///
/// let summary = metrics.summarize();
/// assert_eq!(summary.avg_ms, 250.0);
/// assert_eq!(summary.median_ms, 250.0);
/// assert_eq!(summary.p95_ms, 400.0);
/// ```
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    total: u64,
    success: u64,
    failure: u64,
    response_times: Vec<f64>,
    errors: BTreeMap<String, u64>,
    per_tool: BTreeMap<String, ToolMetrics>,
    start: Instant,
    last_record: Option<Instant>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    /// Create an empty aggregator. Throughput is measured from this instant.
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// Create an empty aggregator with an explicit start time.
    pub fn started_at(start: Instant) -> Self {
        Self {
            total: 0,
            success: 0,
            failure: 0,
            response_times: Vec::new(),
            errors: BTreeMap::new(),
            per_tool: BTreeMap::new(),
            start,
            last_record: None,
        }
    }

    /// Record one call outcome.
    pub fn record(&mut self, sample: CallSample) {
        self.record_at(sample, Instant::now());
    }

    /// Record one call outcome observed at `at`.
    pub fn record_at(&mut self, sample: CallSample, at: Instant) {
        let duration = if sample.duration_ms.is_finite() {
            sample.duration_ms.max(0.0)
        } else {
            0.0
        };

        self.total += 1;
        self.response_times.push(duration);

        let tool = self.per_tool.entry(sample.tool_name).or_default();
        tool.total += 1;
        tool.response_times.push(duration);

        match sample.error {
            None => {
                self.success += 1;
                tool.success += 1;
            },
            Some(message) => {
                self.failure += 1;
                tool.failure += 1;
                *self.errors.entry(message).or_insert(0) += 1;
            },
        }

        self.last_record = Some(self.last_record.map_or(at, |prev| prev.max(at)));
    }

    /// Total calls recorded so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Compute summary statistics. Calling this repeatedly with no intervening
    /// `record` yields identical output.
    pub fn summarize(&self) -> MetricsSummary {
        let elapsed_secs = self
            .last_record
            .map(|last| last.saturating_duration_since(self.start).as_secs_f64())
            .unwrap_or(0.0);
        let throughput = if elapsed_secs > 0.0 {
            self.total as f64 / elapsed_secs
        } else {
            0.0
        };

        let mut sorted = self.response_times.clone();
        sorted.sort_by(f64::total_cmp);

        let per_tool = self
            .per_tool
            .iter()
            .map(|(name, tool)| {
                let summary = ToolSummary {
                    total: tool.total,
                    success: tool.success,
                    failure: tool.failure,
                    avg_ms: mean(&tool.response_times),
                };
                (name.clone(), summary)
            })
            .collect();

        MetricsSummary {
            total: self.total,
            success: self.success,
            failure: self.failure,
            avg_ms: mean(&sorted),
            median_ms: median(&sorted),
            p95_ms: percentile_95(&sorted),
            throughput,
            elapsed_secs,
            errors: self.errors.clone(),
            per_tool,
        }
    }
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of an ascending-sorted slice; 0 for an empty slice.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 0 => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
        _ => sorted[n / 2],
    }
}

/// Nearest-rank 95th percentile of an ascending-sorted slice: the element at
/// index `ceil(0.95 * n) - 1`, clamped into range. 0 for an empty slice.
pub fn percentile_95(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let rank = (0.95 * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}

/// One attempted tool call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Tool the call targeted.
    pub tool_name: String,
    /// Arguments sent (or that would have been sent).
    pub args: Value,
    /// The tool's `tools/call` result (content items and `isError`) on success.
    pub result: Option<Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Call latency in milliseconds.
    pub duration_ms: f64,
}

impl CallRecord {
    /// The metrics sample equivalent of this record.
    pub fn to_sample(&self) -> CallSample {
        CallSample {
            tool_name: self.tool_name.clone(),
            duration_ms: self.duration_ms,
            error: self.error.clone(),
        }
    }
}

/// Ordered, append-only log of [`CallRecord`]s.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CallLog {
    records: Vec<CallRecord>,
}

impl CallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: CallRecord) {
        self.records.push(record);
    }

    /// All records in call order.
    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no call has been logged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in call order.
    pub fn iter(&self) -> std::slice::Iter<'_, CallRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a CallLog {
    type Item = &'a CallRecord;
    type IntoIter = std::slice::Iter<'a, CallRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
