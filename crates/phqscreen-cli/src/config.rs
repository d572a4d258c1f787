use phqscreen_scoring::ClassifierConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `phqscreen.toml`.
#[derive(Debug, Deserialize)]
pub struct ScreenConfig {
    /// Root for `messages/` and `analysis/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    /// Required by `serve`; the read-only commands work without it.
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// `[server]`
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[responder]`: where bot replies come from.
#[derive(Debug, Deserialize)]
pub struct ResponderConfig {
    /// Intents file in the `{"intents": [...]}` format. Relative paths
    /// resolve against the config file's directory.
    #[serde(default)]
    pub intents_path: Option<PathBuf>,
    /// Reply used when no intents file is configured.
    #[serde(default = "default_reply")]
    pub default_reply: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            intents_path: None,
            default_reply: default_reply(),
        }
    }
}

/// `[security]`
#[derive(Debug, Deserialize, Default)]
pub struct SecurityConfig {
    /// Keys accepted by the API; empty disables auth.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_reply() -> String {
    "I'm here to listen.".to_string()
}

impl ScreenConfig {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads the config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::parse(""),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }

    pub fn messages_dir(&self) -> PathBuf {
        self.data_dir.join("messages")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.data_dir.join("analysis")
    }
}
