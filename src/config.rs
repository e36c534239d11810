use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub drive: DriveConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    /// Path to the stored OAuth credential JSON (token + refresh token).
    pub credentials_path: PathBuf,
    /// Folder id that roots all discovery and is the default upload target.
    pub root_folder_id: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_max_depth() -> usize {
    10
}
fn default_include_globs() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_transcribe_model")]
    pub transcribe_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            transcribe_model: default_transcribe_model(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_transcribe_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}
fn default_voice() -> String {
    "Kore".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Minimum non-whitespace characters for an extraction to count as
    /// usable text. Artifacts below this are not marked ingested.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_min_text_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_base_name")]
    pub base_name: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_base_name() -> String {
    "reply".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./saves")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate drive
    if config.drive.root_folder_id.trim().is_empty() {
        anyhow::bail!("drive.root_folder_id must be set");
    }

    if config.drive.max_depth < 1 {
        anyhow::bail!("drive.max_depth must be >= 1");
    }

    // Validate chat
    if config.chat.model.trim().is_empty() {
        anyhow::bail!("chat.model must not be empty");
    }

    // A zero threshold would let failed extractions into the dedup set,
    // blocking any later retry of the same artifact.
    if config.ingest.min_text_chars < 1 {
        anyhow::bail!("ingest.min_text_chars must be >= 1");
    }

    if config.render.base_name.trim().is_empty() {
        anyhow::bail!("render.base_name must not be empty");
    }

    Ok(config)
}
