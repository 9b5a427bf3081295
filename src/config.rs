use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_db_path() -> PathBuf {
    PathBuf::from("movies.db")
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "phi3:mini".to_string()
}

fn default_ollama_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_ollama_timeout_secs")]
    pub ollama_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            ollama_base_url: default_ollama_base_url(),
            ollama_model: default_ollama_model(),
            ollama_timeout_secs: default_ollama_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".movieagent")
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Load the config file, writing one with defaults on first run.
    pub async fn load_or_default() -> Result<Self> {
        let config_file = Self::config_file();

        if config_file.exists() {
            let content = tokio::fs::read_to_string(&config_file).await?;
            let config: AppConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    pub async fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        tokio::fs::create_dir_all(&config_dir).await?;

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(Self::config_file(), content).await?;

        Ok(())
    }
}
