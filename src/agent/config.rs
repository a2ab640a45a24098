use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Nickname of the persona that must always exist.
pub const DEFAULT_AGENT: &str = "default";

pub type AgentMap = BTreeMap<String, Agent>;

/// A named persona: a system prompt paired with the model that answers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub nickname: String,
    #[serde(rename = "role_system")]
    pub system_prompt: String,
    pub model: String,
}

impl Agent {
    pub fn new(
        nickname: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            nickname: nickname.into(),
            system_prompt: system_prompt.into(),
            model: model.into(),
        }
    }

    pub(crate) fn builtin_default() -> Self {
        Self::new(DEFAULT_AGENT, "speak in chinese", "openai/gpt-4o-mini")
    }
}

/// The persisted configuration, stored as `config/quickchat.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub hotkeys: HotkeySettings,
    #[serde(default)]
    pub agents: AgentMap,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut agents = AgentMap::new();
        agents.insert(DEFAULT_AGENT.to_string(), Agent::builtin_default());
        Self {
            openai: OpenAiSettings::default(),
            hotkeys: HotkeySettings::default(),
            agents,
        }
    }
}

impl AppConfig {
    /// Re-inserts the `default` agent if a hand-edited file dropped it.
    /// Returns `true` when the config had to be repaired.
    pub fn ensure_default_agent(&mut self) -> bool {
        if self.agents.contains_key(DEFAULT_AGENT) {
            return false;
        }
        self.agents
            .insert(DEFAULT_AGENT.to_string(), Agent::builtin_default());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
        }
    }
}

impl OpenAiSettings {
    /// The configured key, falling back to `OPENAI_API_KEY` when the file leaves it blank.
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            Some(self.api_key.trim().to_string())
        } else {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
        }
    }
}

fn default_base_url() -> String {
    String::from("https://api.openai.com/v1")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeySettings {
    #[serde(default = "default_show_window")]
    pub show_window: String,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            show_window: default_show_window(),
        }
    }
}

fn default_show_window() -> String {
    String::from("alt+z")
}

/// Where the configuration lives between runs.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<AppConfig>;

    fn save(&self, config: &AppConfig) -> Result<()>;

    /// Persists only the agent table, leaving the other sections as stored.
    fn save_agents(&self, agents: &AgentMap) -> Result<()> {
        let mut config = self.load()?;
        config.agents = agents.clone();
        self.save(&config)
    }
}

/// TOML file store rooted at a workspace directory.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("config").join("quickchat.toml"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    /// Reads the config file, writing the defaults first if it does not exist yet.
    fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            info!("Created default config at {}", self.path.display());
            return Ok(config);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read config: {}", self.path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", self.path.display()))?;
        if config.ensure_default_agent() {
            warn!(
                "Config {} had no `default` agent, restored the built-in one",
                self.path.display()
            );
            self.save(&config)?;
        }
        Ok(config)
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.exists()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config dir: {}", dir.display()))?;
        }
        let serialized = toml::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write config: {}", self.path.display()))?;
        Ok(())
    }
}

/// Keeps the config in memory. Clones share the same state, so a test can
/// hand one copy to the app and inspect saves through another.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    config: AppConfig,
    saves: usize,
    fail_saves: bool,
}

impl MemoryConfigStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                config,
                saves: 0,
                fail_saves: false,
            })),
        }
    }

    pub fn snapshot(&self) -> AppConfig {
        self.lock().config.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Makes every following save fail, to exercise rollback paths.
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<AppConfig> {
        Ok(self.lock().config.clone())
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(anyhow!("config store is read-only"));
        }
        state.config = config.clone();
        state.saves += 1;
        Ok(())
    }
}
