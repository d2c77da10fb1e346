//! TOML-based load test configuration.
//!
//! A config file has three parts: `[settings]` for the run loop, `[mock]` for
//! argument synthesis, and an optional list of `[[sequence]]` steps. When a
//! sequence is present every iteration runs it; otherwise iterations call
//! tools directly.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! num_calls = 100
//! delay_ms = 100
//! run_all = false
//!
//! [mock]
//! string_length = 8
//! number_min = 0
//! number_max = 1000
//!
//! [mock.fields]
//! email = "load@example.com"
//!
//! [[sequence]]
//! type = "tool_call"
//! tool = "create_user"
//! static_inputs = { role = "admin" }
//! output_mapping = { user_id = "$.id" }
//!
//! [[sequence]]
//! type = "tool_call"
//! tool = "get_user"
//! input_mapping = { id = "$.user_id" }
//! output_type = "text"
//! ```
//!
//! The target server URL is not part of the config file. It is provided on the
//! command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::loadtest::error::LoadTestError;
use crate::loadtest::sequence::SequenceStep;
use crate::loadtest::synth::MockConfig;

/// Directory holding the config file and reports, relative to the project.
pub const CONFIG_DIR: &str = ".loadtest";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "loadtest.toml";

/// Top-level load test configuration parsed from a TOML file.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LoadTestConfig {
    /// Run loop settings.
    #[serde(default)]
    pub settings: Settings,
    /// Argument synthesis settings.
    #[serde(default)]
    pub mock: MockConfig,
    /// Steps executed in order on every iteration. The field name is
    /// `sequence` because TOML `[[sequence]]` tables create that key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence: Vec<SequenceStep>,
}

/// Run loop settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Iterations to attempt.
    #[serde(default = "default_num_calls")]
    pub num_calls: u64,
    /// Fixed wait after every tool invocation, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Call every tool on each iteration instead of a random one.
    #[serde(default)]
    pub run_all: bool,
}

fn default_num_calls() -> u64 {
    10
}

fn default_delay_ms() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_calls: default_num_calls(),
            delay_ms: default_delay_ms(),
            run_all: false,
        }
    }
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - `num_calls` is at least 1
    /// - `number_min <= number_max`, both finite with a finite span
    /// - every tool call step names a tool
    /// - every mapping parses
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.settings.num_calls == 0 {
            return Err(LoadTestError::ConfigValidation {
                message: "settings.num_calls must be greater than 0".to_string(),
            });
        }

        let (min, max) = (self.mock.number_min, self.mock.number_max);
        if !min.is_finite() || !max.is_finite() || !(max - min).is_finite() {
            return Err(LoadTestError::ConfigValidation {
                message: format!(
                    "mock.number_min ({min}) and mock.number_max ({max}) must be finite with a finite span"
                ),
            });
        }

        if self.mock.number_min > self.mock.number_max {
            return Err(LoadTestError::ConfigValidation {
                message: format!(
                    "mock.number_min ({}) must not exceed mock.number_max ({})",
                    self.mock.number_min, self.mock.number_max
                ),
            });
        }

        for (i, step) in self.sequence.iter().enumerate() {
            if let SequenceStep::ToolCall(call) = step {
                if call.tool.trim().is_empty() {
                    return Err(LoadTestError::ConfigValidation {
                        message: format!("Sequence step {} has an empty tool name", i + 1),
                    });
                }
            }
            step.validate().map_err(|e| LoadTestError::ConfigValidation {
                message: format!("Sequence step {}: {e}", i + 1),
            })?;
        }

        Ok(())
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, num_calls: Option<u64>, delay_ms: Option<u64>, run_all: bool) {
        if let Some(n) = num_calls {
            self.settings.num_calls = n;
        }
        if let Some(d) = delay_ms {
            self.settings.delay_ms = d;
        }
        if run_all {
            self.settings.run_all = true;
        }
    }
}

/// Default config path under `root`.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Discover `.loadtest/loadtest.toml` by walking parent directories.
///
/// Starts from `start` and walks up until either the file is found or the
/// filesystem root is reached.
pub fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = config_path(&dir);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::sequence::OutputType;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[settings]
num_calls = 50
delay_ms = 0
run_all = true

[mock]
string_length = 4
number_min = 1
number_max = 9

[mock.fields]
email = "load@example.com"

[[sequence]]
type = "tool_call"
tool = "create_user"
static_inputs = { role = "admin" }
input_mapping = { name = "$.user_name", "profile.city" = "$.city", owner = { id = "$.owner.id" } }
output_mapping = { user_id = "$.id" }

[[sequence]]
type = "context_transform"
input_mapping = { first_user = "$.users[*]" }
path_args = { wrap = false }

[[sequence]]
type = "tool_call"
tool = "describe"
output_type = "text"
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.settings.num_calls, 50);
        assert!(config.settings.run_all);
        assert_eq!(config.mock.string_length, 4);
        assert_eq!(config.mock.number_max, 9.0);
        assert_eq!(config.mock.fields["email"], "load@example.com");
        assert_eq!(config.sequence.len(), 3);

        match &config.sequence[0] {
            SequenceStep::ToolCall(call) => {
                assert_eq!(call.tool, "create_user");
                assert_eq!(call.static_inputs["role"], "admin");
                assert_eq!(call.input_mapping["owner"]["id"], "$.owner.id");
                assert_eq!(call.output_type, OutputType::Json);
            },
            other => panic!("Expected ToolCall, got {:?}", other),
        }
        match &config.sequence[1] {
            SequenceStep::ContextTransform(t) => assert_eq!(t.path_args.wrap, Some(false)),
            other => panic!("Expected ContextTransform, got {:?}", other),
        }
        match &config.sequence[2] {
            SequenceStep::ToolCall(call) => assert_eq!(call.output_type, OutputType::Text),
            other => panic!("Expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LoadTestConfig::from_toml("").unwrap();
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.mock, MockConfig::default());
        assert!(config.sequence.is_empty());
    }

    #[test]
    fn test_zero_num_calls_rejected() {
        let err = LoadTestConfig::from_toml("[settings]\nnum_calls = 0\n").unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigValidation { .. }));
        assert!(err.to_string().contains("num_calls"));
    }

    #[test]
    fn test_inverted_number_range_rejected() {
        let err = LoadTestConfig::from_toml("[mock]\nnumber_min = 10\nnumber_max = 1\n").unwrap_err();
        assert!(err.to_string().contains("number_min"));
    }

    #[test]
    fn test_non_finite_number_bounds_rejected() {
        for mock in [
            "number_max = inf",
            "number_min = -inf",
            "number_min = nan",
            "number_min = -1e308\nnumber_max = 1e308",
        ] {
            let err = LoadTestConfig::from_toml(&format!("[mock]\n{mock}\n")).unwrap_err();
            assert!(
                matches!(err, LoadTestError::ConfigValidation { .. }),
                "{mock} accepted"
            );
            assert!(err.to_string().contains("finite"));
        }
    }

    #[test]
    fn test_empty_tool_name_rejected() {
        let toml_str = r#"
[[sequence]]
type = "tool_call"
tool = " "
"#;
        let err = LoadTestConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("empty tool name"));
    }

    #[test]
    fn test_malformed_mapping_rejected() {
        let toml_str = r#"
[[sequence]]
type = "tool_call"
tool = "echo"
input_mapping = { count = 3 }
"#;
        let err = LoadTestConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("Sequence step 1"));
    }

    #[test]
    fn test_unknown_step_type_is_parse_error() {
        let toml_str = r#"
[[sequence]]
type = "prompt"
tool = "echo"
"#;
        let err = LoadTestConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigParse { .. }));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = LoadTestConfig::default();
        config.apply_overrides(Some(7), None, true);
        assert_eq!(config.settings.num_calls, 7);
        assert_eq!(config.settings.delay_ms, 100);
        assert!(config.settings.run_all);

        config.apply_overrides(None, Some(0), false);
        assert_eq!(config.settings.delay_ms, 0);
        assert!(config.settings.run_all);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[settings]\nnum_calls = 3").unwrap();
        let config = LoadTestConfig::load(file.path()).unwrap();
        assert_eq!(config.settings.num_calls, 3);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = LoadTestConfig::load(Path::new("/nonexistent/loadtest.toml")).unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigIo { .. }));
    }

    #[test]
    fn test_discover_config_walks_up() {
        let root = tempfile::tempdir().unwrap();
        let path = config_path(root.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();

        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_config(&nested), Some(path));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let toml_str = r#"
[[sequence]]
type = "tool_call"
tool = "echo"
static_inputs = { text = "hi" }
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        let rendered = toml::to_string(&config).unwrap();
        assert_eq!(LoadTestConfig::from_toml(&rendered).unwrap(), config);
    }
}
