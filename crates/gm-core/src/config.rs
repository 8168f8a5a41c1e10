use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub compaction: CompactionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Never serialized back out.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub scenario_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tunables for the context compactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionSettings {
    /// Extra messages tolerated above the history threshold before
    /// compaction triggers.
    pub margin: usize,
    /// Lower bound on the number of recent messages kept verbatim.
    pub minimum_keep: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            margin: 3,
            minimum_keep: 5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gm-chat");
        Self {
            api: ApiConfig {
                base_url: "https://api.openai.com/v1".into(),
                api_key: None,
            },
            storage: StorageConfig {
                data_dir,
                scenario_dir: PathBuf::from("masks"),
            },
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            compaction: CompactionSettings::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Empty values are
    /// ignored; unparsable numbers keep the default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(key) = get("API_KEY") {
            config.api.api_key = Some(key);
        }
        if let Some(url) = get("BASE_URL") {
            config.api.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = get("GM_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("GM_SCENARIO_DIR") {
            config.storage.scenario_dir = PathBuf::from(dir);
        }
        if let Some(bind) = get("GM_BIND") {
            match bind.rsplit_once(':').map(|(h, p)| (h, p.parse::<u16>())) {
                Some((host, Ok(port))) => {
                    config.server.host = host.to_string();
                    config.server.port = port;
                }
                _ => tracing::warn!(value = %bind, "ignoring malformed GM_BIND"),
            }
        }
        if let Some(v) = get("GM_COMPACTION_MARGIN") {
            match v.parse() {
                Ok(margin) => config.compaction.margin = margin,
                Err(_) => tracing::warn!(value = %v, "ignoring malformed GM_COMPACTION_MARGIN"),
            }
        }
        if let Some(v) = get("GM_COMPACTION_FLOOR") {
            match v.parse() {
                Ok(floor) => config.compaction.minimum_keep = floor,
                Err(_) => tracing::warn!(value = %v, "ignoring malformed GM_COMPACTION_FLOOR"),
            }
        }
        config
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
