//! Maps model tool calls onto the three operations

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tool::{Operation, ToolCall, ToolResult, Toolbox};

/// A tool call after dispatch
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub operation: Operation,
    /// `None` when the arguments failed validation
    pub call: Option<ToolCall>,
    pub result: ToolResult,
    /// Source text the call produced or rendered
    pub source: Option<String>,
}

impl Dispatched {
    pub fn rationale(&self) -> Option<&str> {
        self.call.as_ref().map(|c| c.rationale())
    }
}

/// Validates and routes tool calls.
///
/// Argument problems become error results; only an unknown operation name
/// escapes as an `Err`.
pub struct Dispatcher {
    toolbox: Toolbox,
    /// Cached compiled JSON schema validators keyed by operation
    schema_cache: HashMap<Operation, Arc<jsonschema::Validator>>,
}

impl Dispatcher {
    pub fn new(toolbox: Toolbox) -> Self {
        let mut schema_cache = HashMap::new();
        for op in Operation::ALL {
            match jsonschema::validator_for(&op.parameters_schema()) {
                Ok(validator) => {
                    schema_cache.insert(op, Arc::new(validator));
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid parameter schema for '{}', relying on typed parsing only: {}",
                        op.name(),
                        e
                    );
                }
            }
        }
        Self {
            toolbox,
            schema_cache,
        }
    }

    /// Resolve a wire name to an operation
    pub fn resolve(&self, name: &str) -> Result<Operation> {
        Operation::from_name(name).ok_or_else(|| Error::UnknownOperation(name.to_string()))
    }

    /// Check arguments against the schema, then parse them into the typed record.
    /// Returns the error text on failure.
    pub fn validate(
        &self,
        operation: Operation,
        arguments: &serde_json::Value,
    ) -> std::result::Result<ToolCall, String> {
        let schema_error = self
            .schema_cache
            .get(&operation)
            .and_then(|validator| validate_with_validator(arguments, validator));
        if let Some(err) = schema_error {
            return Err(format!(
                "Argument validation failed for {}: {}",
                operation.name(),
                err
            ));
        }
        ToolCall::parse(operation, arguments).map_err(|e| {
            format!("Argument validation failed for {}: {}", operation.name(), e)
        })
    }

    /// Validate and run one call. `entry_point` is the scene identifier of the run.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        entry_point: &str,
    ) -> Result<Dispatched> {
        let operation = self.resolve(name)?;

        let call = match self.validate(operation, arguments) {
            Ok(call) => call,
            Err(message) => {
                tracing::warn!("{}", message);
                return Ok(Dispatched {
                    operation,
                    call: None,
                    result: ToolResult::error(message),
                    source: None,
                });
            }
        };

        tracing::debug!(
            operation = operation.name(),
            rationale = call.rationale(),
            "dispatching tool call"
        );

        let (result, source) = match &call {
            ToolCall::Generate(args) => {
                match self
                    .toolbox
                    .generator
                    .generate(&args.description, &args.reasoning, entry_point)
                    .await
                {
                    Ok(generated) => {
                        let mut details = json!({ "scene_name": entry_point });
                        if let Some(ref path) = generated.path {
                            details["source_path"] = json!(path.display().to_string());
                        }
                        (
                            ToolResult::text(&generated.source).with_details(details),
                            Some(generated.source),
                        )
                    }
                    Err(e) => (
                        ToolResult::error(format!("Code generation failed: {}", e)),
                        None,
                    ),
                }
            }
            ToolCall::Run(args) => {
                let outcome = self
                    .toolbox
                    .executor
                    .execute(&args.manim_code, &args.scene_name)
                    .await;
                (ToolResult::from_run(&outcome), Some(args.manim_code.clone()))
            }
            ToolCall::GetConfiguration(_) => match self.toolbox.inspector.inspect().await {
                Ok(text) => (ToolResult::text(text), None),
                Err(e) => (
                    ToolResult::error(format!("Could not read configuration: {}", e)),
                    None,
                ),
            },
        };

        Ok(Dispatched {
            operation,
            call: Some(call),
            result,
            source,
        })
    }
}

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::tool::{
        CodeExecutor, CodeGenerator, ConfigInspector, GeneratedSource, RunOutcome, RunStatus,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts invocations of every operation
    #[derive(Default)]
    pub(crate) struct Counters {
        pub generate: AtomicU32,
        pub run: AtomicU32,
        pub inspect: AtomicU32,
        /// Rationale of the latest generate call
        pub rationale: parking_lot::Mutex<Option<String>>,
    }

    pub(crate) struct FakeOps {
        pub counters: Arc<Counters>,
        pub source: String,
        /// Render outcomes returned in order; the last one repeats
        pub outcomes: parking_lot::Mutex<Vec<RunOutcome>>,
    }

    impl FakeOps {
        pub fn toolbox(source: &str, outcomes: Vec<RunOutcome>) -> (Toolbox, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            let ops = Arc::new(FakeOps {
                counters: counters.clone(),
                source: source.to_string(),
                outcomes: parking_lot::Mutex::new(outcomes),
            });
            (Toolbox::new(ops.clone(), ops.clone(), ops), counters)
        }
    }

    #[async_trait]
    impl CodeGenerator for FakeOps {
        async fn generate(
            &self,
            _description: &str,
            rationale: &str,
            _entry_point: &str,
        ) -> std::result::Result<GeneratedSource, OperationError> {
            self.counters.generate.fetch_add(1, Ordering::Relaxed);
            *self.counters.rationale.lock() = Some(rationale.to_string());
            Ok(GeneratedSource::new(self.source.clone()))
        }
    }

    #[async_trait]
    impl CodeExecutor for FakeOps {
        async fn execute(&self, _source: &str, entry_point: &str) -> RunOutcome {
            self.counters.run.fetch_add(1, Ordering::Relaxed);
            let mut outcomes = self.outcomes.lock();
            let outcome = if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| RunOutcome::failure("no outcome configured"))
            };
            if outcome.is_success() {
                RunOutcome::success(format!("Rendered {}", entry_point))
            } else {
                outcome
            }
        }
    }

    #[async_trait]
    impl ConfigInspector for FakeOps {
        async fn inspect(&self) -> std::result::Result<String, OperationError> {
            self.counters.inspect.fetch_add(1, Ordering::Relaxed);
            Ok("[CLI]\nquality = medium_quality".to_string())
        }
    }

    fn dispatcher(outcomes: Vec<RunOutcome>) -> (Dispatcher, Arc<Counters>) {
        let (toolbox, counters) = FakeOps::toolbox("class circleScene(Scene): ...", outcomes);
        (Dispatcher::new(toolbox), counters)
    }

    #[tokio::test]
    async fn test_missing_required_argument_never_invokes() {
        let (dispatcher, counters) = dispatcher(vec![RunOutcome::success("ok")]);
        for (name, args) in [
            ("generate_manim_code", json!({"reasoning": "r"})),
            ("run_manim_code", json!({"reasoning": "r", "manim_code": "x"})),
            ("get_manim_configuration", json!({})),
        ] {
            let dispatched = dispatcher.dispatch(name, &args, "circleScene").await.unwrap();
            assert!(dispatched.result.is_error, "{} should fail validation", name);
            assert!(dispatched.call.is_none());
            assert!(
                dispatched.result.text_content().contains("Argument validation failed"),
                "got: {}",
                dispatched.result.text_content()
            );
        }
        assert_eq!(counters.generate.load(Ordering::Relaxed), 0);
        assert_eq!(counters.run.load(Ordering::Relaxed), 0);
        assert_eq!(counters.inspect.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_wrong_type_and_malformed_arguments() {
        let (dispatcher, counters) = dispatcher(vec![]);
        let wrong_type = json!({"reasoning": 7, "description": "circle"});
        let d = dispatcher
            .dispatch("generate_manim_code", &wrong_type, "circleScene")
            .await
            .unwrap();
        assert!(d.result.is_error);

        // Arguments that were not valid JSON arrive as a string
        let malformed = serde_json::Value::String("{\"reasoning\":".into());
        let d = dispatcher
            .dispatch("get_manim_configuration", &malformed, "circleScene")
            .await
            .unwrap();
        assert!(d.result.is_error);
        assert_eq!(counters.inspect.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_loudly() {
        let (dispatcher, _) = dispatcher(vec![]);
        let err = dispatcher
            .dispatch("rm_rf", &json!({}), "circleScene")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOperation(ref n) if n == "rm_rf"));
    }

    #[tokio::test]
    async fn test_generate_result_carries_scene_name() {
        let (dispatcher, counters) = dispatcher(vec![]);
        let d = dispatcher
            .dispatch(
                "generate_manim_code",
                &json!({"reasoning": "start", "description": "a red circle"}),
                "circleScene",
            )
            .await
            .unwrap();
        assert!(!d.result.is_error);
        assert_eq!(d.rationale(), Some("start"));
        assert_eq!(counters.rationale.lock().as_deref(), Some("start"));
        let payload: serde_json::Value = serde_json::from_str(&d.result.payload()).unwrap();
        assert_eq!(payload["scene_name"], "circleScene");
        assert_eq!(payload["result"], "class circleScene(Scene): ...");
        assert_eq!(counters.generate.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_run_result_has_explicit_status() {
        let (dispatcher, _) =
            dispatcher(vec![RunOutcome::failure("NameError: undefined name 'circl'")]);
        let d = dispatcher
            .dispatch(
                "run_manim_code",
                &json!({"reasoning": "r", "manim_code": "circl()", "scene_name": "circleScene"}),
                "circleScene",
            )
            .await
            .unwrap();
        assert_eq!(d.result.run_status, Some(RunStatus::Failure));
        assert!(d.result.text_content().contains("undefined name 'circl'"));
        assert_eq!(d.source.as_deref(), Some("circl()"));
    }

    #[tokio::test]
    async fn test_extra_arguments_are_ignored() {
        let (dispatcher, counters) = dispatcher(vec![]);
        let d = dispatcher
            .dispatch(
                "get_manim_configuration",
                &json!({"reasoning": "check fps", "verbose": true}),
                "circleScene",
            )
            .await
            .unwrap();
        assert!(!d.result.is_error);
        assert!(d.result.text_content().contains("quality"));
        assert_eq!(counters.inspect.load(Ordering::Relaxed), 1);
    }
}
