//! Turns a description into scene source with a language model

use async_trait::async_trait;
use regex::Regex;
use reel_agent::tool::{CodeGenerator, GeneratedSource};
use reel_agent::workspace::file_stem;
use reel_agent::{OperationError, Workspace, prompt};
use reel_ai::providers::LlmProvider;
use reel_ai::{Context, Message, Model, ReasoningLevel, StreamOptions};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap());

/// Take the first fenced block if the model wrapped its answer in Markdown
pub fn strip_code_fences(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Keeps generated sources in the working directory, with a timestamped
/// backup of every distinct version
#[derive(Clone)]
pub struct SourceStore {
    workspace: Arc<Workspace>,
}

impl SourceStore {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Write `source` as the entry point's working file.
    /// Returns the working path and the backup written, if any.
    pub fn persist(
        &self,
        entry_point: &str,
        source: &str,
    ) -> std::io::Result<(PathBuf, Option<PathBuf>)> {
        let path = self.workspace.source_path(entry_point);
        let unchanged = fs::read_to_string(&path)
            .map(|existing| existing == source)
            .unwrap_or(false);
        if unchanged {
            tracing::debug!("{} unchanged, no backup written", path.display());
            return Ok((path, None));
        }

        fs::write(&path, source)?;

        let backups = self.workspace.backups_dir();
        fs::create_dir_all(&backups)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
        let backup = backups.join(format!("{}_{}.py", file_stem(entry_point), stamp));
        fs::write(&backup, source)?;

        Ok((path, Some(backup)))
    }
}

/// Asks a model for scene code. One request per call, no retries.
pub struct ModelGenerator {
    provider: Arc<dyn LlmProvider>,
    model: Model,
    reasoning: Option<ReasoningLevel>,
    store: Option<SourceStore>,
}

impl ModelGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Model) -> Self {
        Self {
            provider,
            model,
            reasoning: None,
            store: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: Option<ReasoningLevel>) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Persist every generated source
    pub fn with_store(mut self, store: SourceStore) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl CodeGenerator for ModelGenerator {
    async fn generate(
        &self,
        description: &str,
        rationale: &str,
        entry_point: &str,
    ) -> Result<GeneratedSource, OperationError> {
        let mut context = Context::with_system(prompt::GENERATOR_SYSTEM_PROMPT);
        context.push(Message::user(prompt::generation_prompt(
            description,
            entry_point,
        )));
        let options = StreamOptions {
            reasoning: self.reasoning,
            ..Default::default()
        };

        tracing::debug!(model = %self.model.id, rationale, "requesting scene code");
        let stream = self
            .provider
            .stream(&self.model, &context, &options)
            .await
            .map_err(|e| OperationError::new(format!("model request failed: {}", e)))?;
        let (message, usage) = reel_ai::stream::collect(stream)
            .await
            .map_err(|e| OperationError::new(format!("model request failed: {}", e)))?;
        tracing::debug!(input = usage.input, output = usage.output, "scene code received");

        let source = strip_code_fences(&message.text());
        if source.is_empty() {
            return Err(OperationError::new("the model returned no code"));
        }

        let mut generated = GeneratedSource::new(source);
        if let Some(ref store) = self.store {
            let (path, backup) = store
                .persist(entry_point, &generated.source)
                .map_err(|e| {
                    OperationError::new(format!("could not save generated code: {}", e))
                })?;
            generated.path = Some(path);
            generated.backup = backup;
        }
        Ok(generated)
    }
}
