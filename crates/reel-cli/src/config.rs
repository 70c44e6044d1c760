//! Configuration file support

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tools::Quality;

/// Configuration for reel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model that drives the agent loop
    pub model: Option<String>,
    /// Model used for code generation; defaults to `model`
    pub generator_model: Option<String>,
    /// Provider (openai, groq, openrouter, ollama, custom)
    pub provider: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
    /// Reasoning effort for reasoning models (off, low, medium, high)
    pub reasoning_level: Option<String>,
    pub max_iterations: Option<u32>,
    /// corrective or abort
    pub free_text_policy: Option<String>,
    /// Token budget for recent messages sent to the model
    pub keep_recent_tokens: Option<u32>,
    /// Retries for transient model errors
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub renderer: RendererConfig,
    /// API keys (alternative to environment variables)
    #[serde(default)]
    pub api_keys: ApiKeys,
}

/// How the renderer is invoked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Program and leading arguments, e.g. `["python", "-m", "manim"]`
    pub command: Option<Vec<String>>,
    /// Arguments that print the active configuration
    pub config_args: Option<Vec<String>>,
    pub quality: Option<Quality>,
    /// Render timeout; 0 disables it
    pub timeout_secs: Option<u64>,
    /// Keep generated sources (with backups) in the working directory
    pub keep_source: Option<bool>,
    pub work_dir: Option<PathBuf>,
    /// Extra environment for the renderer process
    pub env: Option<BTreeMap<String, String>>,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub groq: Option<String>,
    pub openrouter: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reel")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for REEL_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("REEL_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults when it is missing or broken
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Get API key for a provider, checking config then env
    pub fn get_api_key(&self, provider: reel_ai::Provider) -> Option<String> {
        let from_config = match provider {
            reel_ai::Provider::OpenAI => self.api_keys.openai.clone(),
            reel_ai::Provider::Groq => self.api_keys.groq.clone(),
            reel_ai::Provider::OpenRouter => self.api_keys.openrouter.clone(),
            _ => None,
        };

        if from_config.is_some() {
            return from_config;
        }

        provider
            .api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# reel configuration file
# Place at ~/.config/reel/config.toml (Linux), ~/Library/Application Support/reel/config.toml (Mac)
# or %APPDATA%\reel\config.toml (Windows), or point REEL_CONFIG_PATH at it.

# Model that drives the agent loop
model = "o3-mini"

# Model used to write scene code (defaults to `model`)
# generator_model = "gpt-4o"

# Provider (openai, groq, openrouter, ollama, custom)
provider = "openai"

# base_url = "http://localhost:11434/v1"

# Reasoning effort for reasoning models (off, low, medium, high)
# reasoning_level = "medium"

# Model requests allowed per run
max_iterations = 25

# What to do when the model answers without a tool call:
# "corrective" keeps insisting on a tool call, "abort" stops the run
free_text_policy = "corrective"

# Send only the first message plus roughly this many tokens of recent history
# keep_recent_tokens = 60000

# Retries for rate limits and transient network errors
max_retries = 0

[renderer]
command = ["python", "-m", "manim"]
config_args = ["cfg", "show"]
quality = "medium"
timeout_secs = 600
keep_source = false
work_dir = "."

[renderer.env]
PYTHONIOENCODING = "utf-8"

# API keys (optional - can also use environment variables or a .env file)
[api_keys]
# openai = "sk-..."
"#
}
