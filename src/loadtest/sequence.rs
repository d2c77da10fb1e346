//! Multi-step workflow execution.
//!
//! A sequence is an ordered list of [`SequenceStep`]s. Tool call steps build
//! their arguments from static values, context lookups and synthesized
//! defaults, invoke the tool, and write selected parts of the output back into
//! the [`ContextStore`]. Context transform steps reshape the store in place
//! without calling anything.
//!
//! Steps run strictly one after another. A step naming an unknown tool is
//! recorded as a failed call and skipped; any other failure aborts the rest of
//! the sequence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::loadtest::channel::{ToolCallResult, ToolChannel, ToolDescriptor};
use crate::loadtest::context::ContextStore;
use crate::loadtest::driver::ToolSession;
use crate::loadtest::error::SequenceError;
use crate::loadtest::path::{PathError, PathExpr, PathOptions, ValueMapping};
use crate::loadtest::synth::ParameterSynthesizer;

/// How a tool's first text content item is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Parse the text as JSON. Parse failure aborts the sequence.
    #[default]
    Json,
    /// Use the text as a JSON string.
    Text,
}

/// One step of a sequence.
///
/// The `type` field in TOML selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SequenceStep {
    /// Invoke a tool and capture its output.
    ToolCall(ToolCallStep),
    /// Rewrite the context store without invoking a tool.
    ContextTransform(ContextTransformStep),
}

/// A step that invokes one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStep {
    /// Name of the tool to call.
    pub tool: String,
    /// Literal argument values, copied first.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub static_inputs: Map<String, Value>,
    /// Argument key path to context path (or nested table of paths).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub input_mapping: Map<String, Value>,
    /// Context key path to output path.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub output_mapping: Map<String, Value>,
    /// How to decode the tool output.
    #[serde(default)]
    pub output_type: OutputType,
}

/// A step that maps the context store onto itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTransformStep {
    /// Context key path to context path (or nested table of paths).
    pub input_mapping: Map<String, Value>,
    /// Result shaping options.
    #[serde(default)]
    pub path_args: PathOptions,
}

impl SequenceStep {
    /// A tool call step with no mappings.
    pub fn tool_call(tool: impl Into<String>) -> ToolCallStep {
        ToolCallStep {
            tool: tool.into(),
            static_inputs: Map::new(),
            input_mapping: Map::new(),
            output_mapping: Map::new(),
            output_type: OutputType::Json,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        match self {
            Self::ToolCall(step) => &step.tool,
            Self::ContextTransform(_) => "context_transform",
        }
    }

    /// Parse every mapping and path this step carries.
    pub fn validate(&self) -> Result<(), PathError> {
        match self {
            Self::ToolCall(step) => {
                ValueMapping::from_map(&step.input_mapping)?;
                step.output_paths()?;
            },
            Self::ContextTransform(step) => {
                ValueMapping::from_map(&step.input_mapping)?;
            },
        }
        Ok(())
    }
}

impl From<ToolCallStep> for SequenceStep {
    fn from(step: ToolCallStep) -> Self {
        Self::ToolCall(step)
    }
}

impl From<ContextTransformStep> for SequenceStep {
    fn from(step: ContextTransformStep) -> Self {
        Self::ContextTransform(step)
    }
}

impl ToolCallStep {
    /// Adds a literal argument.
    pub fn with_static(mut self, key: impl Into<String>, value: Value) -> Self {
        self.static_inputs.insert(key.into(), value);
        self
    }

    /// Adds an input mapping entry.
    pub fn with_input(mut self, key: impl Into<String>, mapping: Value) -> Self {
        self.input_mapping.insert(key.into(), mapping);
        self
    }

    /// Adds an output mapping entry.
    pub fn with_output(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.output_mapping.insert(key.into(), Value::String(path.into()));
        self
    }

    /// Sets the output decoding.
    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    /// Output mapping entries as parsed paths. Only plain path strings are
    /// accepted here; there is nothing to nest on the output side.
    fn output_paths(&self) -> Result<Vec<(&str, PathExpr)>, PathError> {
        self.output_mapping
            .iter()
            .map(|(key, value)| match value {
                Value::String(path) => Ok((key.as_str(), PathExpr::parse(path)?)),
                _ => Err(PathError::InvalidMapping {
                    key: key.clone(),
                    reason: "output mappings must be path strings".to_string(),
                }),
            })
            .collect()
    }
}

impl<C: ToolChannel> ToolSession<C> {
    /// Run `steps` against a fresh context store and return it.
    ///
    /// On failure the partially written store is dropped along with the error.
    pub async fn execute_sequence(&mut self, steps: &[SequenceStep]) -> Result<ContextStore, SequenceError> {
        let mut context = ContextStore::new();
        self.execute_sequence_with(steps, &mut context).await?;
        Ok(context)
    }

    /// Run `steps` against a caller-owned context store.
    ///
    /// Writes made before a failing step remain in `context`.
    pub async fn execute_sequence_with(
        &mut self,
        steps: &[SequenceStep],
        context: &mut ContextStore,
    ) -> Result<(), SequenceError> {
        for (index, step) in steps.iter().enumerate() {
            debug!(step = index + 1, label = step.label(), "executing sequence step");
            match step {
                SequenceStep::ToolCall(call) => self.run_tool_call(call, context).await?,
                SequenceStep::ContextTransform(transform) => {
                    let mapping = ValueMapping::from_map(&transform.input_mapping)?;
                    context.transform(&mapping, transform.path_args)?;
                },
            }
        }
        Ok(())
    }

    async fn run_tool_call(&mut self, step: &ToolCallStep, context: &mut ContextStore) -> Result<(), SequenceError> {
        let Some(tool) = self.find_tool(&step.tool).cloned() else {
            warn!(tool = %step.tool, "sequence step names an unknown tool, skipping");
            self.record_unknown_tool(&step.tool, Value::Object(step.static_inputs.clone()));
            return Ok(());
        };

        let output_paths = step.output_paths()?;
        let arguments = build_arguments(step, &tool, context, self.synthesizer())?;

        let result = self
            .call_tool(&step.tool, Value::Object(arguments))
            .await
            .map_err(|source| SequenceError::Call {
                tool: step.tool.clone(),
                source,
            })?;
        let output = extract_output(&step.tool, &result, step.output_type)?;

        for (key, path) in output_paths {
            let value = path.resolve(&output)?.into_value();
            context.write(key, value)?;
        }
        Ok(())
    }
}

/// Assemble a tool's argument object.
///
/// Static inputs are copied first, then each input mapping entry is
/// point-written from the context, then any required field still missing is
/// synthesized from its schema.
pub fn build_arguments(
    step: &ToolCallStep,
    tool: &ToolDescriptor,
    context: &ContextStore,
    synth: &ParameterSynthesizer,
) -> Result<Map<String, Value>, PathError> {
    let mut arguments = step.static_inputs.clone();

    let mapping = ValueMapping::from_map(&step.input_mapping)?;
    mapping.apply(context.as_map(), &mut arguments, PathOptions::default())?;

    for field in tool.required_fields() {
        if arguments.contains_key(field) {
            continue;
        }
        let schema = tool
            .property_schema(field)
            .cloned()
            .unwrap_or(Value::Null);
        arguments.insert(field.to_string(), synth.generate_field(field, &schema));
    }
    Ok(arguments)
}

/// Decode the first text content item of a tool result.
pub fn extract_output(tool: &str, result: &ToolCallResult, output_type: OutputType) -> Result<Value, SequenceError> {
    match output_type {
        OutputType::Json => {
            let text = result
                .first_text()
                .ok_or_else(|| SequenceError::MissingOutput { tool: tool.to_string() })?;
            serde_json::from_str(text).map_err(|source| SequenceError::OutputDecode {
                tool: tool.to_string(),
                source,
            })
        },
        OutputType::Text => Ok(Value::String(result.first_text().unwrap_or_default().to_string())),
    }
}
