//! reel-agent: agent loop that generates, renders and repairs scene code
//!
//! This crate provides the conversation, the three tool operations and
//! their dispatcher, and the loop that drives a model through them until a
//! render succeeds or the iteration budget runs out.

pub mod agent;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod prompt;
pub mod retention;
pub mod run_log;
pub mod tool;
pub mod transport;
pub mod workspace;

pub use agent::{Agent, AgentConfig, FreeTextPolicy, RunReport};
pub use conversation::Conversation;
pub use dispatch::{Dispatched, Dispatcher};
pub use error::{Error, OperationError, Result};
pub use events::{AgentEvent, Termination};
pub use retention::RetentionPolicy;
pub use run_log::RunLog;
pub use tool::{
    CodeExecutor, CodeGenerator, ConfigInspector, GeneratedSource, Operation, RunOutcome,
    RunStatus, ToolCall, ToolResult, Toolbox,
};
pub use transport::{AgentRunConfig, ProviderTransport, RetryConfig, Transport};
pub use workspace::Workspace;
