//! OpenAI Chat Completions API provider
//!
//! Works against any endpoint speaking the chat completions wire format
//! (OpenAI, Groq, OpenRouter, Ollama).

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::{
    error::{Error, Result},
    stream::{MessageEvent, MessageEventStream},
    types::{
        AssistantMetadata, Content, Context, Message, Model, StopReason, StreamOptions, Usage,
    },
};

/// Tool call slots accepted per response; indexes past this are ignored
const MAX_TOOL_CALLS: usize = 64;

/// OpenAI API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    fn headers(&self, model: &Model) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| Error::InvalidApiKey)?;
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        // Add model-specific headers
        for (key, value) in &model.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                headers.insert(name, val);
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream> {
        let request = build_request(model, context, options);
        let url = format!("{}/chat/completions", model.base_url);
        tracing::debug!(
            model = %model.id,
            messages = request.messages.len(),
            tool_choice = ?request.tool_choice,
            "sending chat completion request"
        );

        let request_builder = self
            .client
            .post(&url)
            .headers(self.headers(model)?)
            .json(&request);

        let mut event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        // Status and connection failures show up before any content; report
        // them as request errors so the caller can decide to retry
        let first = match event_source.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                event_source.close();
                return Err(open_error(e).await);
            }
            None => return Err(Error::Sse("event stream closed before opening".to_string())),
        };

        let events = futures::stream::iter([Ok(first)]).chain(event_source);
        Ok(Box::pin(create_stream(events, model.clone())))
    }
}

fn build_request(model: &Model, context: &Context, options: &StreamOptions) -> OpenAIRequest {
    let mut messages = Vec::new();

    if let Some(ref system_prompt) = context.system_prompt {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system_prompt.clone()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in &context.messages {
        messages.push(convert_message(msg));
    }

    let tools: Option<Vec<OpenAITool>> = if context.tools.is_empty() {
        None
    } else {
        Some(
            context
                .tools
                .iter()
                .map(|t| OpenAITool {
                    tool_type: "function".to_string(),
                    function: OpenAIFunction {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.parameters.clone()),
                    },
                })
                .collect(),
        )
    };

    let has_tools = tools.is_some();
    OpenAIRequest {
        model: model.id.clone(),
        messages,
        stream: true,
        stream_options: Some(OpenAIStreamOptions {
            include_usage: true,
        }),
        max_completion_tokens: options.max_tokens,
        temperature: options.temperature,
        reasoning_effort: options
            .reasoning
            .and_then(|r| r.as_effort())
            .map(str::to_string),
        tools,
        tool_choice: has_tools.then(|| options.tool_choice.as_str().to_string()),
        parallel_tool_calls: has_tools.then_some(false),
    }
}

fn text_of(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| c.as_text())
        .collect::<Vec<_>>()
        .join("")
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    match msg {
        Message::User { content, .. } => OpenAIMessage {
            role: "user".to_string(),
            content: Some(text_of(content)),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, .. } => {
            let tool_calls: Vec<OpenAIToolCall> = content
                .iter()
                .filter_map(|c| match c {
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => Some(OpenAIToolCall {
                        id: id.clone(),
                        call_type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: name.clone(),
                            arguments: arguments.to_string(),
                        },
                    }),
                    _ => None,
                })
                .collect();

            let text = text_of(content);
            OpenAIMessage {
                role: "assistant".to_string(),
                content: (!text.is_empty()).then_some(text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }
        }
        Message::ToolResult {
            tool_call_id,
            content,
            ..
        } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(text_of(content)),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

/// Map a failure to open the event stream onto a request error
async fn open_error(error: reqwest_eventsource::Error) -> Error {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            status_error(status, retry_after, &body)
        }
        reqwest_eventsource::Error::Transport(e) => Error::Http(e),
        other => Error::Sse(other.to_string()),
    }
}

fn status_error(status: reqwest::StatusCode, retry_after: Option<u64>, body: &str) -> Error {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Error::RateLimited { retry_after };
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Error::InvalidApiKey;
    }

    let detail = serde_json::from_str::<ApiErrorBody>(body).ok();
    let error_type = if status.is_server_error() {
        "server_error".to_string()
    } else {
        detail
            .as_ref()
            .and_then(|b| b.error.error_type.clone())
            .unwrap_or_else(|| format!("http_{}", status.as_u16()))
    };
    let message = match detail {
        Some(b) => b.error.message,
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => body.to_string(),
    };
    Error::api(error_type, message)
}

fn create_stream<S>(mut events: S, model: Model) -> impl futures::Stream<Item = MessageEvent>
where
    S: futures::Stream<Item = std::result::Result<Event, reqwest_eventsource::Error>> + Unpin,
{
    stream! {
        let mut accumulated_text = String::new();
        let mut tool_calls: Vec<(String, String, String)> = Vec::new(); // (id, name, args)
        let mut finish_reason: Option<String> = None;
        let mut usage = Usage::default();

        yield MessageEvent::Start {
            message: Message::Assistant {
                content: vec![],
                metadata: AssistantMetadata {
                    model: Some(model.id.clone()),
                    ..Default::default()
                },
            },
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    let chunk: std::result::Result<StreamChunk, _> = serde_json::from_str(&msg.data);
                    match chunk {
                        Ok(chunk) => {
                            for choice in &chunk.choices {
                                if let Some(ref content) = choice.delta.content {
                                    accumulated_text.push_str(content);
                                    yield MessageEvent::TextDelta {
                                        content_index: 0,
                                        delta: content.clone(),
                                    };
                                }

                                if let Some(ref tcs) = choice.delta.tool_calls {
                                    for tc in tcs {
                                        let Some(idx) = usize::try_from(tc.index)
                                            .ok()
                                            .filter(|&i| i < MAX_TOOL_CALLS)
                                        else {
                                            tracing::warn!("ignoring tool call with index {}", tc.index);
                                            continue;
                                        };
                                        while tool_calls.len() <= idx {
                                            tool_calls.push((String::new(), String::new(), String::new()));
                                        }

                                        if let Some(ref id) = tc.id {
                                            tool_calls[idx].0 = id.clone();
                                        }
                                        if let Some(ref function) = tc.function {
                                            if let Some(ref name) = function.name {
                                                tool_calls[idx].1 = name.clone();
                                                // Text occupies index 0
                                                yield MessageEvent::ToolCallStart {
                                                    content_index: idx + 1,
                                                    id: tool_calls[idx].0.clone(),
                                                    name: name.clone(),
                                                };
                                            }
                                            if let Some(ref args) = function.arguments {
                                                tool_calls[idx].2.push_str(args);
                                                yield MessageEvent::ToolCallDelta {
                                                    content_index: idx + 1,
                                                    delta: args.clone(),
                                                };
                                            }
                                        }
                                    }
                                }

                                if let Some(ref reason) = choice.finish_reason {
                                    finish_reason = Some(reason.clone());
                                }
                            }

                            // Usage arrives in the final chunk when include_usage is set
                            if let Some(ref stream_usage) = chunk.usage {
                                usage.input = stream_usage.prompt_tokens;
                                usage.output = stream_usage.completion_tokens;
                            }
                        }
                        Err(e) => {
                            yield MessageEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield MessageEvent::Error {
                        message: format!("HTTP {}: {}", status, api_error_message(&body)),
                    };
                    return;
                }
                Err(e) => {
                    yield MessageEvent::Error {
                        message: format!("SSE error: {}", e),
                    };
                    return;
                }
            }
        }
        let message = final_message(
            &model,
            accumulated_text,
            tool_calls,
            finish_reason.as_deref(),
            &usage,
        );
        let stop_reason = match &message {
            Message::Assistant { metadata, .. } => metadata.stop_reason.unwrap_or(StopReason::Stop),
            _ => StopReason::Stop,
        };

        yield MessageEvent::Done {
            message,
            stop_reason,
            usage,
        };
    }
}

fn final_message(
    model: &Model,
    text: String,
    tool_calls: Vec<(String, String, String)>,
    finish_reason: Option<&str>,
    usage: &Usage,
) -> Message {
    let mut content = Vec::new();

    if !text.is_empty() {
        content.push(Content::Text { text });
    }

    for (id, name, args) in tool_calls {
        if !id.is_empty() && !name.is_empty() {
            // Malformed argument JSON is kept as a string so validation can report it
            let arguments = serde_json::from_str(&args).unwrap_or(serde_json::Value::String(args));
            content.push(Content::ToolCall {
                id,
                name,
                arguments,
            });
        }
    }

    let stop_reason = match finish_reason {
        Some("stop") => Some(StopReason::Stop),
        Some("length") => Some(StopReason::Length),
        Some("tool_calls") => Some(StopReason::ToolUse),
        _ => None,
    };

    Message::Assistant {
        content,
        metadata: AssistantMetadata {
            provider: Some(model.provider),
            model: Some(model.id.clone()),
            usage: usage.clone(),
            stop_reason,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAIStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
}

#[derive(Debug, Serialize)]
struct OpenAIStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: i32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provider, ReasoningLevel, Tool, ToolChoice};

    fn test_model() -> Model {
        Model::new(Provider::OpenAI, "o3-mini", None)
    }

    fn context_with_tool() -> Context {
        let mut context = Context::with_system("You are a Manim animation expert.");
        context.add_tool(Tool::new(
            "get_manim_configuration",
            "Returns the current Manim configuration",
            serde_json::json!({"type": "object"}),
        ));
        context.push(Message::user("draw a red circle"));
        context
    }

    #[test]
    fn test_request_carries_tool_choice() {
        let options = StreamOptions {
            tool_choice: ToolChoice::Required,
            ..Default::default()
        };
        let request = build_request(&test_model(), &context_with_tool(), &options);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tool_choice"], "required");
        assert_eq!(json["parallel_tool_calls"], false);
        assert_eq!(json["tools"][0]["function"]["name"], "get_manim_configuration");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "draw a red circle");
    }

    #[test]
    fn test_request_without_tools_omits_tool_fields() {
        let mut context = Context::default();
        context.push(Message::user("write code"));
        let options = StreamOptions {
            reasoning: Some(ReasoningLevel::High),
            ..Default::default()
        };
        let json = serde_json::to_value(build_request(&test_model(), &context, &options)).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("parallel_tool_calls").is_none());
        assert_eq!(json["reasoning_effort"], "high");
    }

    #[test]
    fn test_convert_assistant_tool_call_and_result() {
        let assistant = Message::assistant(vec![Content::tool_call(
            "call_1",
            "run_manim_code",
            serde_json::json!({"scene_name": "circleScene"}),
        )]);
        let converted = serde_json::to_value(convert_message(&assistant)).unwrap();
        assert!(converted.get("content").is_none());
        assert_eq!(converted["tool_calls"][0]["id"], "call_1");
        let args: serde_json::Value = serde_json::from_str(
            converted["tool_calls"][0]["function"]["arguments"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(args["scene_name"], "circleScene");

        let result =
            Message::tool_result("call_1", "run_manim_code", vec![Content::text("{}")], false);
        let converted = serde_json::to_value(convert_message(&result)).unwrap();
        assert_eq!(converted["role"], "tool");
        assert_eq!(converted["tool_call_id"], "call_1");
    }

    #[test]
    fn test_final_message_keeps_malformed_arguments_as_string() {
        let message = final_message(
            &test_model(),
            String::new(),
            vec![("c1".into(), "run_manim_code".into(), "{not json".into())],
            Some("tool_calls"),
            &Usage::default(),
        );
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2, &serde_json::Value::String("{not json".into()));
        match message {
            Message::Assistant { metadata, .. } => {
                assert_eq!(metadata.stop_reason, Some(StopReason::ToolUse))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_status_errors_map_to_request_errors() {
        use reqwest::StatusCode;

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, Some(7), "");
        assert!(matches!(limited, Error::RateLimited { retry_after: Some(7) }));
        assert!(limited.is_retryable());

        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE, None, "upstream down");
        assert!(unavailable.is_retryable());
        assert!(unavailable.to_string().contains("upstream down"));

        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, ""),
            Error::InvalidApiKey
        ));

        let body = r#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#;
        let bad = status_error(StatusCode::NOT_FOUND, None, body);
        assert!(!bad.is_retryable());
        assert_eq!(bad.to_string(), "API error: model not found (type: invalid_request_error)");
    }

    #[tokio::test]
    async fn test_out_of_range_tool_index_is_ignored() {
        let chunks = [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":-1,"id":"bad","function":{"name":"x","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_manim_configuration","arguments":"{\"reasoning\":\"r\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ];
        let events: Vec<std::result::Result<Event, reqwest_eventsource::Error>> = chunks
            .iter()
            .map(|data| {
                Ok(Event::Message(eventsource_stream::Event {
                    data: data.to_string(),
                    ..Default::default()
                }))
            })
            .collect();

        let stream = create_stream(futures::stream::iter(events), test_model());
        let (message, _) = crate::stream::collect(Box::pin(stream)).await.unwrap();
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn test_api_error_message_extraction() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Incorrect API key provided");
        assert_eq!(api_error_message("gateway timeout"), "gateway timeout");
    }
}
