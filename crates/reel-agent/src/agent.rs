//! The agent loop: request a model action, dispatch it, fold the result back in

use reel_ai::{Content, Message, Model, ReasoningLevel, StreamOptions, ToolChoice, Usage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    conversation::Conversation,
    dispatch::Dispatcher,
    error::{Error, Result},
    events::{AgentEvent, Termination},
    prompt,
    retention::RetentionPolicy,
    tool::{RunStatus, ToolCall, Toolbox},
    transport::{AgentEventStream, AgentRunConfig, Transport},
};

/// What to do when the model answers without calling a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreeTextPolicy {
    /// Force tool usage and keep correcting the model until the budget runs out
    #[default]
    Corrective,
    /// Force tool usage once; a second prose answer in a row ends the run
    Abort,
}

impl FreeTextPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "corrective" | "soft" => Some(Self::Corrective),
            "abort" | "hard" => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System prompt
    pub system_prompt: String,
    /// Model to use
    pub model: Model,
    /// Reasoning effort for reasoning models
    pub reasoning: Option<ReasoningLevel>,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
    /// Model requests allowed per run
    pub max_iterations: u32,
    pub free_text_policy: FreeTextPolicy,
    pub retention: RetentionPolicy,
}

impl AgentConfig {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

    pub fn new(model: Model) -> Self {
        Self {
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            model,
            reasoning: None,
            max_tokens: None,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            free_text_policy: FreeTextPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Returned when a render succeeds
#[derive(Debug, Clone)]
pub struct RunReport {
    pub entry_point: String,
    /// Model requests used, including the successful one
    pub iterations: u32,
    /// The source that rendered
    pub source: Option<String>,
    /// Where that source was kept, if it was
    pub source_path: Option<PathBuf>,
    pub usage: Usage,
}

/// Drives one model through generate / run / repair cycles
pub struct Agent {
    config: AgentConfig,
    conversation: Conversation,
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<AgentEvent>,
}

impl Agent {
    /// Create a new agent
    pub fn new(config: AgentConfig, transport: Arc<dyn Transport>, toolbox: Toolbox) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            conversation: Conversation::default(),
            dispatcher: Dispatcher::new(toolbox),
            transport,
            event_tx,
        }
    }

    /// Subscribe to agent events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Messages of the current or most recent run
    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    fn run_config(&self, tool_choice: ToolChoice) -> AgentRunConfig {
        AgentRunConfig {
            system_prompt: Some(self.config.system_prompt.clone()),
            tools: Toolbox::api_tools(),
            model: self.config.model.clone(),
            options: StreamOptions {
                max_tokens: self.config.max_tokens,
                temperature: None,
                reasoning: self.config.reasoning,
                tool_choice,
            },
        }
    }

    /// Run until a render succeeds, the budget runs out, or a fatal error occurs
    pub async fn run(&mut self, request: &str, entry_point: &str) -> Result<RunReport> {
        let max_iterations = self.config.max_iterations;
        self.conversation = Conversation::new(Message::user(prompt::build_agent_prompt(
            request,
            entry_point,
        )));
        let _ = self.event_tx.send(AgentEvent::RunStart {
            request: request.to_string(),
            entry_point: entry_point.to_string(),
            max_iterations,
        });

        let mut free_text_streak = 0u32;

        for iteration in 1..=max_iterations {
            let _ = self.event_tx.send(AgentEvent::IterationStart {
                iteration,
                max_iterations,
            });

            let tool_choice = if free_text_streak > 0 {
                ToolChoice::Required
            } else {
                ToolChoice::Auto
            };
            let view = self.config.retention.view(self.conversation.messages());
            tracing::debug!(
                iteration,
                messages = view.len(),
                tool_choice = tool_choice.as_str(),
                "requesting model action"
            );

            let run_config = self.run_config(tool_choice);
            let mut event_stream = match self.transport.run(view, &run_config).await {
                Ok(s) => s,
                Err(e) => return Err(self.fail(e.into(), iteration)),
            };

            let (assistant_message, turn_usage, stream_error) =
                self.process_stream(&mut event_stream).await;
            if let Some(message) = stream_error {
                return Err(self.fail(Error::ModelStream(message), iteration));
            }
            self.conversation.total_usage.add(&turn_usage);

            let Some(message) = assistant_message else {
                return Err(self.fail(
                    Error::ModelStream("model returned no message".to_string()),
                    iteration,
                ));
            };

            let tool_calls: Vec<(String, String, serde_json::Value)> = message
                .tool_calls()
                .into_iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
                .collect();

            if tool_calls.is_empty() {
                free_text_streak += 1;
                let text = message.text();
                if text.trim().is_empty() {
                    self.conversation
                        .push(Message::assistant_text(prompt::EMPTY_RESPONSE));
                } else {
                    self.conversation.push(message);
                }
                tracing::warn!(
                    iteration,
                    consecutive = free_text_streak,
                    "model answered without a tool call"
                );
                let _ = self.event_tx.send(AgentEvent::FreeTextTurn {
                    iteration,
                    text,
                    consecutive: free_text_streak,
                });

                if free_text_streak >= 2 {
                    match self.config.free_text_policy {
                        FreeTextPolicy::Corrective => {
                            self.conversation
                                .push(Message::user(prompt::CORRECTIVE_INSTRUCTION));
                        }
                        FreeTextPolicy::Abort => {
                            return Err(self.fail(
                                Error::NonCompliant {
                                    iteration,
                                    consecutive: free_text_streak,
                                },
                                iteration,
                            ));
                        }
                    }
                }
                continue;
            }

            free_text_streak = 0;
            self.conversation.push(message);

            let mut calls = tool_calls.into_iter();
            let Some((id, name, args)) = calls.next() else {
                continue;
            };

            let _ = self.event_tx.send(AgentEvent::ToolExecutionStart {
                iteration,
                tool_call_id: id.clone(),
                tool_name: name.clone(),
                arguments: args.clone(),
            });

            let dispatched = match self.dispatcher.dispatch(&name, &args, entry_point).await {
                Ok(d) => d,
                Err(e) => return Err(self.fail(e, iteration)),
            };

            let payload = dispatched.result.payload();
            self.conversation.push(Message::tool_result(
                &id,
                &name,
                vec![Content::text(&payload)],
                dispatched.result.is_error,
            ));
            let _ = self.event_tx.send(AgentEvent::ToolExecutionEnd {
                iteration,
                tool_call_id: id,
                tool_name: name,
                rationale: dispatched.rationale().map(str::to_string),
                result: payload,
                is_error: dispatched.result.is_error,
                run_status: dispatched.result.run_status,
                source: dispatched.source.clone(),
            });

            self.skip_remaining_tools(iteration, calls);

            if dispatched.result.run_status == Some(RunStatus::Success) {
                let rendered = match dispatched.call {
                    Some(ToolCall::Run(ref args)) => args.scene_name.clone(),
                    _ => entry_point.to_string(),
                };
                let source_path = dispatched
                    .result
                    .details
                    .as_ref()
                    .and_then(|d| d.get("source_path"))
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from);

                let _ = self.event_tx.send(AgentEvent::RunEnd {
                    termination: Termination::Success {
                        entry_point: rendered.clone(),
                    },
                    iterations: iteration,
                    total_usage: self.conversation.total_usage.clone(),
                });
                return Ok(RunReport {
                    entry_point: rendered,
                    iterations: iteration,
                    source: dispatched.source,
                    source_path,
                    usage: self.conversation.total_usage.clone(),
                });
            }
        }

        Err(self.fail(
            Error::BudgetExhausted {
                iterations: max_iterations,
                max: max_iterations,
            },
            max_iterations,
        ))
    }

    /// Answer every call after the first with an error result so each call id
    /// in the conversation is matched.
    fn skip_remaining_tools(
        &mut self,
        iteration: u32,
        calls: impl Iterator<Item = (String, String, serde_json::Value)>,
    ) {
        for (skip_id, skip_name, _) in calls {
            tracing::warn!("Skipping extra tool call '{}' in the same turn", skip_name);
            let _ = self.event_tx.send(AgentEvent::ToolCallSkipped {
                iteration,
                tool_call_id: skip_id.clone(),
                tool_name: skip_name.clone(),
            });
            let skipped = crate::tool::ToolResult::error(
                "Skipped: only the first tool call of a turn is executed. Call it again in a separate turn.",
            );
            self.conversation.push(Message::tool_result(
                skip_id,
                skip_name,
                vec![Content::text(skipped.payload())],
                true,
            ));
        }
    }

    /// Process the event stream, forwarding events to subscribers.
    /// Returns (assistant_message, turn_usage, error_if_any).
    async fn process_stream(
        &self,
        event_stream: &mut AgentEventStream,
    ) -> (Option<Message>, Usage, Option<String>) {
        use futures::StreamExt;

        let mut assistant_message: Option<Message> = None;
        let mut turn_usage = Usage::default();
        let mut error: Option<String> = None;

        while let Some(event) = event_stream.next().await {
            let _ = self.event_tx.send(event.clone());

            match event {
                AgentEvent::MessageEnd { message } => {
                    assistant_message = Some(message);
                }
                AgentEvent::TurnEnd { usage, .. } => {
                    turn_usage = usage;
                }
                AgentEvent::Error { message } => {
                    error = Some(message);
                }
                _ => {}
            }
        }

        (assistant_message, turn_usage, error)
    }

    /// Report a terminal failure to subscribers and hand the error back
    fn fail(&self, error: Error, iterations: u32) -> Error {
        let termination = match error {
            Error::BudgetExhausted { .. } => Termination::Exhausted,
            ref other => Termination::Fatal {
                message: other.to_string(),
            },
        };
        tracing::debug!("run ended: {}", error);
        let _ = self.event_tx.send(AgentEvent::RunEnd {
            termination,
            iterations,
            total_usage: self.conversation.total_usage.clone(),
        });
        error
    }
}
