//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for sketch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model used for generation
    pub model: String,
    /// Embedding model used for the documentation index
    pub embedding_model: String,
    /// Vector dimensionality of the embedding model
    pub embedding_dimensions: u32,
    /// Base URL for the OpenAI-compatible API
    pub api_base_url: String,
    /// Python interpreter used for validation and execution
    pub python_bin: String,
    /// Directory where rendered diagram images land
    pub output_dir: Option<String>,
    /// Qdrant base URL
    pub qdrant_url: Option<String>,
    /// Qdrant collection holding the documentation index
    pub collection: String,
    /// Maximum generation attempts per user turn
    pub max_attempts: u32,
    /// API keys (alternative to environment variables)
    #[serde(default)]
    pub api_keys: ApiKeys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            api_base_url: "https://api.openai.com/v1".to_string(),
            python_bin: "python3".to_string(),
            output_dir: None,
            qdrant_url: None,
            collection: "diagram_symbols".to_string(),
            max_attempts: 5,
            api_keys: ApiKeys::default(),
        }
    }
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub qdrant: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sketch")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for SKETCH_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("SKETCH_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
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

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        Config::default().save()?;
        Ok(path)
    }

    /// Get the OpenAI API key, checking config then env
    pub fn openai_api_key(&self) -> Option<String> {
        self.api_keys
            .openai
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    /// Get the Qdrant API key, checking config then env
    pub fn qdrant_api_key(&self) -> Option<String> {
        self.api_keys
            .qdrant
            .clone()
            .or_else(|| std::env::var("QDRANT_API_KEY").ok())
    }

    /// Get the Qdrant base URL, checking config then env
    pub fn qdrant_url(&self) -> Option<String> {
        self.qdrant_url
            .clone()
            .or_else(|| std::env::var("QDRANT_URL").ok())
    }

    /// Directory where rendered diagrams are written
    pub fn images_dir(&self) -> PathBuf {
        match self.output_dir {
            Some(ref dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sketch")
                .join("images"),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# sketch configuration file
# Place at ~/.config/sketch/config.toml (Linux/Mac) or %APPDATA%\sketch\config.toml (Windows)

# Chat model used for diagram generation
model = "gpt-4o-mini"

# Embedding model backing the documentation index
embedding_model = "text-embedding-3-small"
embedding_dimensions = 1536

# Base URL for the OpenAI-compatible API
api_base_url = "https://api.openai.com/v1"

# Python interpreter used for import validation and diagram rendering
python_bin = "python3"

# Where rendered diagram images are written (defaults to the local data dir)
# output_dir = "/tmp/sketch-images"

# Qdrant instance holding the documentation index (optional; lookups degrade
# gracefully when unset)
# qdrant_url = "http://localhost:6333"
collection = "diagram_symbols"

# Maximum generation attempts per user turn
max_attempts = 5

# API keys (optional - can also use environment variables)
# It's recommended to use environment variables instead for security
[api_keys]
# openai = "sk-..."
# qdrant = "..."
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.embedding_dimensions, 1536);
        assert_eq!(config.collection, "diagram_symbols");
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = toml::from_str("model = \"gpt-4o\"").unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.python_bin, "python3");
        assert!(config.qdrant_url.is_none());
    }
}
