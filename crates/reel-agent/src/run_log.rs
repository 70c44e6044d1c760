//! Structured record of one run, built from agent events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::events::{AgentEvent, Termination};

/// One dispatched tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationEntry {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub result: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Complete record of a run, written as one JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub request: String,
    pub scene: String,
    pub model: String,
    pub iterations: Vec<IterationEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Termination>,
}

impl RunLog {
    pub fn new(
        request: impl Into<String>,
        scene: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request: request.into(),
            scene: scene.into(),
            model: model.into(),
            iterations: Vec::new(),
            outcome: None,
        }
    }

    /// Fold an event into the log; events that carry nothing to record are ignored
    pub fn record(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::ToolExecutionEnd {
                iteration,
                tool_name,
                rationale,
                result,
                is_error,
                source,
                ..
            } => {
                self.iterations.push(IterationEntry {
                    iteration: *iteration,
                    timestamp: Utc::now(),
                    operation: tool_name.clone(),
                    rationale: rationale.clone(),
                    result: result.clone(),
                    is_error: *is_error,
                    source: source.clone(),
                });
            }
            AgentEvent::FreeTextTurn {
                iteration, text, ..
            } => {
                self.iterations.push(IterationEntry {
                    iteration: *iteration,
                    timestamp: Utc::now(),
                    operation: "free_text".to_string(),
                    rationale: None,
                    result: text.clone(),
                    is_error: true,
                    source: None,
                });
            }
            AgentEvent::RunEnd { termination, .. } => {
                self.outcome = Some(termination.clone());
            }
            _ => {}
        }
    }

    /// Write the log as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::RunStatus;
    use reel_ai::Usage;

    #[test]
    fn test_record_and_save() {
        let mut log = RunLog::new("draw a red circle", "circleScene", "o3-mini");
        log.record(&AgentEvent::IterationStart {
            iteration: 1,
            max_iterations: 25,
        });
        log.record(&AgentEvent::ToolExecutionEnd {
            iteration: 1,
            tool_call_id: "call_1".into(),
            tool_name: "run_manim_code".into(),
            rationale: Some("first render".into()),
            result: "{\"result\":\"ok\"}".into(),
            is_error: false,
            run_status: Some(RunStatus::Success),
            source: Some("class circleScene(Scene): ...".into()),
        });
        log.record(&AgentEvent::RunEnd {
            termination: Termination::Success {
                entry_point: "circleScene".into(),
            },
            iterations: 1,
            total_usage: Usage::default(),
        });
        assert_eq!(log.iterations.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.json");
        log.save(&path).unwrap();

        let loaded = RunLog::load(&path).unwrap();
        assert_eq!(loaded.scene, "circleScene");
        assert_eq!(loaded.iterations[0].operation, "run_manim_code");
        assert_eq!(
            loaded.outcome,
            Some(Termination::Success {
                entry_point: "circleScene".into()
            })
        );
    }
}
