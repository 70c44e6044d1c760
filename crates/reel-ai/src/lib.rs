//! reel-ai: chat completions client for OpenAI-compatible endpoints
//!
//! This crate provides the message types, tool definitions and streaming
//! provider used by the reel agent to talk to a language model.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use stream::MessageEventStream;
pub use types::*;
