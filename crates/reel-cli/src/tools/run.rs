//! Renders scene source with the external renderer

use async_trait::async_trait;
use reel_agent::tool::{CodeExecutor, RunOutcome};
use reel_agent::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Render quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Renderer command-line flag
    pub fn flag(&self) -> &'static str {
        match self {
            Quality::Low => "-ql",
            Quality::Medium => "-qm",
            Quality::High => "-qh",
        }
    }
}

/// How to launch the renderer
#[derive(Debug, Clone)]
pub struct Renderer {
    pub program: String,
    /// Arguments placed before the per-call arguments
    pub args: Vec<String>,
    /// Arguments that print the active configuration
    pub config_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec!["-m".to_string(), "manim".to_string()],
            config_args: vec!["cfg".to_string(), "show".to_string()],
            env: BTreeMap::from([("PYTHONIOENCODING".to_string(), "utf-8".to_string())]),
        }
    }
}

impl Renderer {
    /// Build from a command line such as `["python", "-m", "manim"]`.
    /// An empty command keeps the default.
    pub fn from_command(command: &[String]) -> Self {
        match command.split_first() {
            Some((program, args)) => Self {
                program: program.clone(),
                args: args.to_vec(),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    /// A command with the program, leading arguments and environment set
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Removes a throwaway scene file on every exit path
struct ScratchFile(Option<PathBuf>);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(ref path) = self.0 {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Executes scene source by invoking the renderer on a working file
pub struct RendererExecutor {
    renderer: Renderer,
    workspace: Arc<Workspace>,
    quality: Quality,
    /// `None` waits forever
    timeout: Option<Duration>,
    keep_source: bool,
}

impl RendererExecutor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    pub fn new(renderer: Renderer, workspace: Arc<Workspace>) -> Self {
        Self {
            renderer,
            workspace,
            quality: Quality::default(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
            keep_source: false,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Zero disables the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn keep_source(mut self, keep: bool) -> Self {
        self.keep_source = keep;
        self
    }

    fn working_path(&self, entry_point: &str) -> PathBuf {
        if self.keep_source {
            self.workspace.run_path(entry_point)
        } else {
            self.workspace.scratch_path(entry_point)
        }
    }

    async fn render(&self, path: &Path, entry_point: &str) -> RunOutcome {
        let mut cmd = self.renderer.command();
        cmd.arg(path)
            .arg(entry_point)
            .arg(self.quality.flag())
            .arg("--disable_caching")
            .current_dir(self.workspace.dir());

        tracing::debug!(
            "rendering {} from {} with {}",
            entry_point,
            path.display(),
            self.renderer.program
        );

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    return RunOutcome::failure(format!(
                        "Rendering timed out after {:?} and was stopped",
                        limit
                    ));
                }
            },
            None => cmd.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => return RunOutcome::failure(format!("Error running renderer: {}", e)),
        };

        if output.status.success() {
            let mut message = format!("Rendered scene {} successfully.", entry_point);
            if self.keep_source {
                message.push_str(&format!(" Source kept at {}", path.display()));
                return RunOutcome::success(message).with_source_path(path.to_path_buf());
            }
            return RunOutcome::success(message);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = if stderr.trim().is_empty() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.trim().is_empty() {
                format!(
                    "Renderer exited with code {} and no output",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stdout.into_owned()
            }
        } else {
            stderr.into_owned()
        };
        RunOutcome::failure(diagnostics)
    }
}

#[async_trait]
impl CodeExecutor for RendererExecutor {
    async fn execute(&self, source: &str, entry_point: &str) -> RunOutcome {
        let path = self.working_path(entry_point);
        if let Err(e) = tokio::fs::write(&path, source).await {
            return RunOutcome::failure(format!(
                "Error writing scene file {}: {}",
                path.display(),
                e
            ));
        }
        let _scratch = ScratchFile((!self.keep_source).then(|| path.clone()));

        self.render(&path, entry_point).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::SourceStore;
    use reel_agent::RunStatus;

    /// Renderer backed by a shell script; the call's arguments arrive as $1.. $4
    fn script_renderer(script: &str) -> Renderer {
        Renderer {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "renderer".to_string()],
            config_args: vec![],
            env: BTreeMap::from([("REEL_TEST_VAR".to_string(), "set".to_string())]),
        }
    }

    fn executor(script: &str) -> (RendererExecutor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::acquire(dir.path().join("work")).unwrap());
        (
            RendererExecutor::new(script_renderer(script), workspace),
            dir,
        )
    }

    #[test]
    fn test_quality_flags() {
        assert_eq!(Quality::Low.flag(), "-ql");
        assert_eq!(Quality::Medium.flag(), "-qm");
        assert_eq!(Quality::High.flag(), "-qh");
        assert_eq!(Quality::default(), Quality::Medium);
    }

    #[test]
    fn test_renderer_from_command() {
        let renderer = Renderer::from_command(&["manim".to_string()]);
        assert_eq!(renderer.program, "manim");
        assert!(renderer.args.is_empty());
        assert_eq!(Renderer::from_command(&[]).program, "python");
    }

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        let (executor, _dir) = executor(
            r#"test "$2" = circleScene && test "$3" = -qh && test "$4" = --disable_caching && test "$REEL_TEST_VAR" = set"#,
        );
        let executor = executor.with_quality(Quality::High);
        let outcome = executor.execute("class circleScene(Scene): pass", "circleScene").await;
        assert_eq!(outcome.status, RunStatus::Success, "{}", outcome.message);
        assert!(outcome.source_path.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_returns_stderr() {
        let (executor, _dir) =
            executor(r#"echo "NameError: name 'circl' is not defined" >&2; exit 1"#);
        let outcome = executor.execute("circl", "circleScene").await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.message.contains("name 'circl' is not defined"));
    }

    #[tokio::test]
    async fn test_stdout_used_when_stderr_empty() {
        let (executor, _dir) = executor(r#"echo "Scene not found"; exit 2"#);
        let outcome = executor.execute("x", "circleScene").await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.message.contains("Scene not found"));
    }

    #[tokio::test]
    async fn test_source_written_then_removed() {
        // The renderer sees the source; the scratch file is gone afterwards
        let (executor, dir) = executor(r#"grep -q "class circleScene" "$1""#);
        let outcome = executor.execute("class circleScene(Scene): pass", "circleScene").await;
        assert!(outcome.is_success(), "{}", outcome.message);
        assert!(!dir.path().join("work").join(".reel_scene_circleScene.py").exists());
    }

    #[tokio::test]
    async fn test_kept_source_reports_path() {
        let (executor, dir) = executor("exit 0");
        let executor = executor.keep_source(true);
        let outcome = executor.execute("class circleScene(Scene): pass", "circleScene").await;
        let expected = dir.path().join("work").join("circleScene.run.py");
        assert_eq!(outcome.source_path.as_deref(), Some(expected.as_path()));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_kept_render_does_not_disturb_backup_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::acquire(dir.path()).unwrap());
        let store = SourceStore::new(workspace.clone());
        let executor = RendererExecutor::new(script_renderer("exit 0"), workspace);
        let executor = executor.keep_source(true);
        let generated = "class circleScene(Scene): pass";

        let (_, first) = store.persist("circleScene", generated).unwrap();
        assert!(first.is_some());
        let outcome = executor
            .execute("class circleScene(Scene):\n    def construct(self): pass", "circleScene")
            .await;
        assert!(outcome.is_success(), "{}", outcome.message);
        let (_, again) = store.persist("circleScene", generated).unwrap();
        assert!(again.is_none(), "regenerating the same code must not add a backup");

        let backups = std::fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert_eq!(backups, 1);
    }

    #[tokio::test]
    async fn test_timeout_kills_renderer() {
        let (executor, _dir) = executor("sleep 5");
        let executor = executor.with_timeout(Duration::from_millis(100));
        let outcome = executor.execute("x", "circleScene").await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_launch_error_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::acquire(dir.path()).unwrap());
        let renderer = Renderer {
            program: "/nonexistent/reel-renderer".to_string(),
            args: vec![],
            config_args: vec![],
            env: BTreeMap::new(),
        };
        let outcome = RendererExecutor::new(renderer, workspace)
            .execute("x", "circleScene")
            .await;
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.message.starts_with("Error running renderer"));
    }
}
