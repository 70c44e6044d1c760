//! Agent event types

use reel_ai::{Message, Usage};
use serde::{Deserialize, Serialize};

use crate::tool::RunStatus;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// A render succeeded
    Success { entry_point: String },
    /// The iteration budget ran out
    Exhausted,
    /// The run stopped on an unrecoverable error
    Fatal { message: String },
}

/// Events emitted during agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Run started
    RunStart {
        request: String,
        entry_point: String,
        max_iterations: u32,
    },

    /// A model turn is about to be requested
    IterationStart { iteration: u32, max_iterations: u32 },

    /// Message streaming started
    MessageStart { message: Message },

    /// Message completed
    MessageEnd { message: Message },

    /// A model turn completed
    TurnEnd { message: Message, usage: Usage },

    /// The model answered without calling a tool
    FreeTextTurn {
        iteration: u32,
        text: String,
        consecutive: u32,
    },

    /// Tool execution started
    ToolExecutionStart {
        iteration: u32,
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolExecutionEnd {
        iteration: u32,
        tool_call_id: String,
        tool_name: String,
        rationale: Option<String>,
        /// Payload returned to the model
        result: String,
        is_error: bool,
        run_status: Option<RunStatus>,
        /// Source generated or rendered by the call
        source: Option<String>,
    },

    /// A second or later call in the same turn was not executed
    ToolCallSkipped {
        iteration: u32,
        tool_call_id: String,
        tool_name: String,
    },

    /// Run finished
    RunEnd {
        termination: Termination,
        iterations: u32,
        total_usage: Usage,
    },

    /// Error reported by the transport
    Error { message: String },
}
