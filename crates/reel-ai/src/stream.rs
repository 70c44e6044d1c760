//! Streaming event types and utilities

use crate::error::{Error, Result};
use crate::types::{Message, StopReason, Usage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted during message streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Initial message structure
    Start { message: Message },
    /// Text content delta
    TextDelta { content_index: usize, delta: String },
    /// Tool call started
    ToolCallStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Tool call arguments delta (partial JSON)
    ToolCallDelta { content_index: usize, delta: String },
    /// Message completed successfully
    Done {
        message: Message,
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Error occurred
    Error { message: String },
}

/// A stream of message events
pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Drain a stream to its final message.
///
/// Returns the `Done` message with its usage, or the first `Error` event as
/// an [`Error::Sse`]. A stream that ends without either is an unexpected response.
pub async fn collect(mut stream: MessageEventStream) -> Result<(Message, Usage)> {
    while let Some(event) = stream.next().await {
        match event {
            MessageEvent::Done { message, usage, .. } => return Ok((message, usage)),
            MessageEvent::Error { message } => return Err(Error::Sse(message)),
            _ => {}
        }
    }
    Err(Error::UnexpectedResponse(
        "stream ended without a final message".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(events: Vec<MessageEvent>) -> MessageEventStream {
        Box::pin(tokio_stream::iter(events))
    }

    #[tokio::test]
    async fn test_collect_returns_done_message() {
        let done = Message::assistant_text("class Circle(Scene): ...");
        let stream = boxed(vec![
            MessageEvent::Start {
                message: Message::assistant(vec![]),
            },
            MessageEvent::TextDelta {
                content_index: 0,
                delta: "class".into(),
            },
            MessageEvent::Done {
                message: done,
                stop_reason: StopReason::Stop,
                usage: Usage { input: 10, output: 4 },
            },
        ]);
        let (message, usage) = collect(stream).await.unwrap();
        assert_eq!(message.text(), "class Circle(Scene): ...");
        assert_eq!(usage.output, 4);
    }

    #[tokio::test]
    async fn test_collect_surfaces_error_event() {
        let stream = boxed(vec![MessageEvent::Error {
            message: "SSE error: 401".into(),
        }]);
        let err = collect(stream).await.unwrap_err();
        assert!(matches!(err, Error::Sse(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn test_collect_without_done_is_unexpected() {
        let err = collect(boxed(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }
}
