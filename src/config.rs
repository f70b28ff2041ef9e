//! Configuration management for db-ask.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named database connections, generation backend settings
//! and pipeline limits.

use crate::db::{
    ExecutionBudget, IntrospectionOptions, DEFAULT_MAX_CELL_CHARS, DEFAULT_MAX_ROWS,
    DEFAULT_SAMPLE_ROWS,
};
use crate::error::{AskError, Result};
use crate::llm::{GenerationSettings, LlmProvider};
use crate::pipeline::{PipelineConfig, DEFAULT_MAX_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable naming the database when nothing else does.
pub const DATABASE_ENV_VAR: &str = "DB_ASK_DATABASE";

const MEMORY_TARGETS: [&str; 2] = ["sqlite::memory:", ":memory:"];

/// Main configuration structure for db-ask.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Generation backend configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Pipeline limits.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Named database connections.
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

/// Generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// "gemini", "openai" or "mock".
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name; the provider default when unset.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

/// The `[pipeline]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSection {
    pub max_attempts: u32,
    pub allow_mutations: bool,
    pub max_rows: usize,
    pub query_timeout_secs: u64,
    pub sample_rows: usize,
    pub max_cell_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            allow_mutations: false,
            max_rows: DEFAULT_MAX_ROWS,
            query_timeout_secs: 30,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_cell_chars: DEFAULT_MAX_CELL_CHARS,
        }
    }
}

impl PipelineSection {
    /// Builds the runtime pipeline configuration from this table.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_attempts: self.max_attempts,
            allow_mutations: self.allow_mutations,
            budget: ExecutionBudget {
                max_rows: self.max_rows,
                timeout: Duration::from_secs(self.query_timeout_secs.max(1)),
            },
            introspection: IntrospectionOptions {
                sample_rows: self.sample_rows,
                max_cell_chars: self.max_cell_chars,
            },
            ..PipelineConfig::default()
        }
    }
}

/// Where a connection points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// A private in-memory database.
    Memory,
    /// A database file on disk.
    File(PathBuf),
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// File path, `sqlite://<path>`, `file://<path>` or `sqlite::memory:`.
    pub path: Option<String>,

    /// Open the file read-only.
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            path: None,
            read_only: default_read_only(),
        }
    }
}

impl ConnectionConfig {
    /// Creates a connection config from a connection string.
    ///
    /// Accepts a plain path, `sqlite://<path>`, `file://<absolute path>`,
    /// `sqlite::memory:` and `:memory:`.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let conn_str = conn_str.trim();
        if conn_str.is_empty() {
            return Err(AskError::config("Connection string is empty"));
        }

        let path = if MEMORY_TARGETS.contains(&conn_str) {
            conn_str.to_string()
        } else if let Some(rest) = conn_str.strip_prefix("sqlite://") {
            if rest.is_empty() {
                return Err(AskError::config("Connection string has no database path"));
            }
            rest.to_string()
        } else if conn_str.starts_with("file://") {
            let url = Url::parse(conn_str)
                .map_err(|e| AskError::config(format!("Invalid connection string: {e}")))?;
            url.to_file_path()
                .map_err(|_| AskError::config(format!("Invalid file URL '{conn_str}'")))?
                .to_string_lossy()
                .into_owned()
        } else if let Some((scheme, _)) = conn_str.split_once("://") {
            return Err(AskError::config(format!(
                "Invalid scheme '{scheme}'. Expected 'sqlite' or 'file'"
            )));
        } else {
            conn_str.to_string()
        };

        Ok(Self {
            path: Some(path),
            read_only: default_read_only(),
        })
    }

    /// Resolves what this connection points at.
    pub fn target(&self) -> Result<StoreTarget> {
        match self.path.as_deref().map(str::trim) {
            None | Some("") => Err(AskError::config(format!(
                "No database configured. Pass a database path, use --connection, or set {DATABASE_ENV_VAR}."
            ))),
            Some(path) if MEMORY_TARGETS.contains(&path) => Ok(StoreTarget::Memory),
            Some(path) => Ok(StoreTarget::File(PathBuf::from(path))),
        }
    }

    /// Applies environment variables as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.path.is_none() {
            self.path = std::env::var(DATABASE_ENV_VAR)
                .ok()
                .filter(|p| !p.trim().is_empty());
        }
    }

    /// Returns a display string for logs and messages.
    pub fn display_string(&self) -> String {
        match self.target() {
            Ok(StoreTarget::Memory) => "in-memory database".to_string(),
            Ok(StoreTarget::File(path)) => {
                let mode = if self.read_only { "read-only" } else { "read-write" };
                format!("{} ({mode})", path.display())
            }
            Err(_) => "unconfigured database".to_string(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-ask")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AskError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AskError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named connection, or the default connection if name is None.
    pub fn get_connection(&self, name: Option<&str>) -> Option<&ConnectionConfig> {
        let key = name.unwrap_or("default");
        self.connections.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
[llm]
provider = "openai"
model = "gpt-4o"
temperature = 0.2

[pipeline]
max_attempts = 5
max_rows = 500

[connections.default]
path = "data/sales.db"

[connections.scratch]
path = "sqlite::memory:"
read_only = false
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.pipeline.sample_rows, 3);

        let default_conn = config.get_connection(None).unwrap();
        assert_eq!(default_conn.path.as_deref(), Some("data/sales.db"));
        assert!(default_conn.read_only);

        let scratch = config.get_connection(Some("scratch")).unwrap();
        assert_eq!(scratch.target().unwrap(), StoreTarget::Memory);
        assert!(!scratch.read_only);

        assert!(config.get_connection(Some("nonexistent")).is_none());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.model, None);
        assert_eq!(config.pipeline, PipelineSection::default());
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_pipeline_section_conversion() {
        let section = PipelineSection {
            max_attempts: 4,
            allow_mutations: true,
            max_rows: 100,
            query_timeout_secs: 5,
            sample_rows: 2,
            max_cell_chars: 20,
        };
        let config = section.to_pipeline_config();
        assert_eq!(config.max_attempts, 4);
        assert!(config.allow_mutations);
        assert_eq!(config.budget.max_rows, 100);
        assert_eq!(config.budget.timeout, Duration::from_secs(5));
        assert_eq!(config.introspection.sample_rows, 2);
        assert_eq!(config.dialect, "SQLite");
    }

    #[test]
    fn test_connection_string_forms() {
        let conn = ConnectionConfig::from_connection_string("data/sales.db").unwrap();
        assert_eq!(
            conn.target().unwrap(),
            StoreTarget::File(PathBuf::from("data/sales.db"))
        );

        let conn = ConnectionConfig::from_connection_string("sqlite://data/sales.db").unwrap();
        assert_eq!(conn.path.as_deref(), Some("data/sales.db"));

        let conn = ConnectionConfig::from_connection_string("sqlite::memory:").unwrap();
        assert_eq!(conn.target().unwrap(), StoreTarget::Memory);
        assert_eq!(conn.display_string(), "in-memory database");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_url() {
        let conn = ConnectionConfig::from_connection_string("file:///tmp/sales.db").unwrap();
        assert_eq!(
            conn.target().unwrap(),
            StoreTarget::File(PathBuf::from("/tmp/sales.db"))
        );
        assert_eq!(conn.display_string(), "/tmp/sales.db (read-only)");
    }

    #[test]
    fn test_connection_string_invalid_scheme() {
        let result = ConnectionConfig::from_connection_string("postgres://localhost/mydb");
        assert!(result.unwrap_err().to_string().contains("Invalid scheme"));

        assert!(ConnectionConfig::from_connection_string("  ").is_err());
        assert!(ConnectionConfig::from_connection_string("sqlite://").is_err());
    }

    #[test]
    fn test_unconfigured_target_is_config_error() {
        let err = ConnectionConfig::default().target().unwrap_err();
        assert!(matches!(err, AskError::Config(_)));
        assert!(err.to_string().contains(DATABASE_ENV_VAR));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\nprovider = \"mock\"\n").unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Mock);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_toml_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nmax_attempts = \"many\"").unwrap();

        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Configuration error in"));
    }

    #[test]
    fn test_generation_settings() {
        let settings = LlmConfig::default().generation_settings();
        assert_eq!(settings.model, None);
        assert_eq!(settings.temperature, 0.0);
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }
}
