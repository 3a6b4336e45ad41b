use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:11434";

/// Persisted settings. Absent keys fall back to defaults at call time.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Settings {
    /// Model server base URL (default: `http://localhost:11434`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Pinned model. When unset the first model the server lists wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
}

impl Settings {
    /// Load settings if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let settings: Settings = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(settings))
    }

    /// Write via a temp file and rename so readers never see a half-written file.
    pub fn save_atomic(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory: {}", dir.display()))?;

        let mut tmp = path.to_path_buf();
        tmp.set_extension("toml.tmp");

        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&tmp, text)
            .with_context(|| format!("failed to write temp config: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move config into place: {}", path.display()))?;
        Ok(())
    }

    /// Values set in `other` win.
    pub fn overlay(mut self, other: &Settings) -> Self {
        if other.server_url.is_some() {
            self.server_url = other.server_url.clone();
        }
        if other.selected_model.is_some() {
            self.selected_model = other.selected_model.clone();
        }
        self
    }

    fn from_env() -> Self {
        Self {
            server_url: non_empty_var("OLLAMA_SUMMARIZER_URL"),
            selected_model: non_empty_var("OLLAMA_SUMMARIZER_MODEL"),
        }
    }

    pub fn server_url_or_default(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Where the coordinator reads its settings from.
///
/// `load` is called once at the start of every generation and never during
/// one, so a change only affects calls started after it.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> anyhow::Result<Settings>;
}

/// Reads `config.toml` on every call, then applies environment and
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct FileConfig {
    path: PathBuf,
    overrides: Settings,
}

impl FileConfig {
    pub fn new(path: PathBuf, overrides: Settings) -> Self {
        Self { path, overrides }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfig {
    fn load(&self) -> anyhow::Result<Settings> {
        let stored = Settings::load_optional(&self.path)?.unwrap_or_default();
        Ok(stored
            .overlay(&Settings::from_env())
            .overlay(&self.overrides))
    }
}
