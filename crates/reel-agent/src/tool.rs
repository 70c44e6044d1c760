//! The three operations the model may call, their argument records and results

use async_trait::async_trait;
use reel_ai::Content;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::OperationError;

/// Operations exposed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generate,
    Run,
    GetConfiguration,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::Generate,
        Operation::Run,
        Operation::GetConfiguration,
    ];

    /// Tool name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Generate => "generate_manim_code",
            Operation::Run => "run_manim_code",
            Operation::GetConfiguration => "get_manim_configuration",
        }
    }

    /// Resolve a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::Generate => {
                "Generates Manim scene code from a natural language description of the animation."
            }
            Operation::Run => {
                "Renders Manim code and reports whether it succeeded, with the renderer's error output on failure."
            }
            Operation::GetConfiguration => "Returns the renderer's current Manim configuration.",
        }
    }

    /// JSON Schema for the operation's arguments
    pub fn parameters_schema(&self) -> serde_json::Value {
        let reasoning = |what: &str| {
            json!({
                "type": "string",
                "description": what,
            })
        };
        match self {
            Operation::Generate => json!({
                "type": "object",
                "properties": {
                    "reasoning": reasoning("Why this Manim code is being generated."),
                    "description": {
                        "type": "string",
                        "description": "A description of the animation to be created."
                    }
                },
                "required": ["reasoning", "description"]
            }),
            Operation::Run => json!({
                "type": "object",
                "properties": {
                    "reasoning": reasoning("Why this Manim code is being run."),
                    "manim_code": {
                        "type": "string",
                        "description": "The Manim Python code to execute."
                    },
                    "scene_name": {
                        "type": "string",
                        "description": "The name of the Manim Scene class within the code."
                    }
                },
                "required": ["reasoning", "manim_code", "scene_name"]
            }),
            Operation::GetConfiguration => json!({
                "type": "object",
                "properties": {
                    "reasoning": reasoning("Why the Manim configuration is being requested.")
                },
                "required": ["reasoning"]
            }),
        }
    }

    /// Convert to a tool definition for API calls
    pub fn to_api_tool(&self) -> reel_ai::Tool {
        reel_ai::Tool::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Arguments of `generate_manim_code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateArgs {
    pub reasoning: String,
    pub description: String,
}

/// Arguments of `run_manim_code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArgs {
    pub reasoning: String,
    pub manim_code: String,
    pub scene_name: String,
}

/// Arguments of `get_manim_configuration`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationArgs {
    pub reasoning: String,
}

/// A validated call from the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Generate(GenerateArgs),
    Run(RunArgs),
    GetConfiguration(ConfigurationArgs),
}

impl ToolCall {
    /// Deserialize arguments into the record for `operation`
    pub fn parse(
        operation: Operation,
        arguments: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match operation {
            Operation::Generate => ToolCall::Generate(GenerateArgs::deserialize(arguments)?),
            Operation::Run => ToolCall::Run(RunArgs::deserialize(arguments)?),
            Operation::GetConfiguration => {
                ToolCall::GetConfiguration(ConfigurationArgs::deserialize(arguments)?)
            }
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            ToolCall::Generate(_) => Operation::Generate,
            ToolCall::Run(_) => Operation::Run,
            ToolCall::GetConfiguration(_) => Operation::GetConfiguration,
        }
    }

    /// The model's stated reason for the call
    pub fn rationale(&self) -> &str {
        match self {
            ToolCall::Generate(args) => &args.reasoning,
            ToolCall::Run(args) => &args.reasoning,
            ToolCall::GetConfiguration(args) => &args.reasoning,
        }
    }
}

/// Status of a render attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Outcome of executing generated source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Short success message, or the renderer's diagnostics on failure
    pub message: String,
    /// Where the source was kept, when it is kept
    pub source_path: Option<PathBuf>,
}

impl RunOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
            source_path: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failure,
            message: message.into(),
            source_path: None,
        }
    }

    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = Some(path);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Source produced by the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    pub source: String,
    /// Working file the source was persisted to
    pub path: Option<PathBuf>,
    /// Backup written because the content changed
    pub backup: Option<PathBuf>,
}

impl GeneratedSource {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: None,
            backup: None,
        }
    }
}

/// Result of a dispatched tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content to return to the LLM
    pub content: Vec<Content>,
    /// Whether the execution resulted in an error
    pub is_error: bool,
    /// Set for render attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,
    /// Extra fields merged into the payload sent to the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            run_status: None,
            details: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            run_status: None,
            details: None,
        }
    }

    /// Wrap a render outcome; failures are errors for the model to repair
    pub fn from_run(outcome: &RunOutcome) -> Self {
        let mut result = match outcome.status {
            RunStatus::Success => Self::text(&outcome.message),
            RunStatus::Failure => Self::error(&outcome.message),
        };
        result.run_status = Some(outcome.status);
        if let Some(ref path) = outcome.source_path {
            result = result.with_details(json!({ "source_path": path.display().to_string() }));
        }
        result
    }

    /// Add details to the result
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the text content as a single string
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON payload appended to the conversation:
    /// `{"result": ...}` or `{"error": ...}` plus any details.
    pub fn payload(&self) -> String {
        let key = if self.is_error { "error" } else { "result" };
        let mut payload = serde_json::Map::new();
        payload.insert(key.to_string(), self.text_content().into());
        if let Some(serde_json::Value::Object(details)) = &self.details {
            for (k, v) in details {
                payload.insert(k.clone(), v.clone());
            }
        }
        serde_json::Value::Object(payload).to_string()
    }
}

/// Turns a description into scene source
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// `rationale` is the model's stated reason for the call, for tracing only
    async fn generate(
        &self,
        description: &str,
        rationale: &str,
        entry_point: &str,
    ) -> Result<GeneratedSource, OperationError>;
}

/// Renders scene source with the external renderer
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Never fails: every problem is a `Failure` outcome
    async fn execute(&self, source: &str, entry_point: &str) -> RunOutcome;
}

/// Reports the renderer's active configuration
#[async_trait]
pub trait ConfigInspector: Send + Sync {
    async fn inspect(&self) -> Result<String, OperationError>;
}

/// The operations available to one run, built once and handed to the agent
#[derive(Clone)]
pub struct Toolbox {
    pub generator: Arc<dyn CodeGenerator>,
    pub executor: Arc<dyn CodeExecutor>,
    pub inspector: Arc<dyn ConfigInspector>,
}

impl Toolbox {
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        executor: Arc<dyn CodeExecutor>,
        inspector: Arc<dyn ConfigInspector>,
    ) -> Self {
        Self {
            generator,
            executor,
            inspector,
        }
    }

    /// Tool definitions for API calls
    pub fn api_tools() -> Vec<reel_ai::Tool> {
        Operation::ALL.iter().map(|op| op.to_api_tool()).collect()
    }
}
