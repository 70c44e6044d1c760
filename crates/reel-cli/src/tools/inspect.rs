//! Reports the renderer's active configuration

use async_trait::async_trait;
use reel_agent::OperationError;
use reel_agent::tool::ConfigInspector;

use super::run::Renderer;

/// Runs the renderer's configuration command and returns what it prints
pub struct RendererInspector {
    renderer: Renderer,
}

impl RendererInspector {
    pub fn new(renderer: Renderer) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl ConfigInspector for RendererInspector {
    async fn inspect(&self) -> Result<String, OperationError> {
        let mut cmd = self.renderer.command();
        cmd.args(&self.renderer.config_args);

        let output = cmd
            .output()
            .await
            .map_err(|e| OperationError::new(format!("Error running renderer: {}", e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() && !output.status.success() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(text)
    }
}
