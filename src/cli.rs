//! Command-line argument parsing for db-ask.

use crate::config::{Config, ConnectionConfig};
use crate::error::{AskError, Result};
use crate::llm::LlmProvider;
use clap::Parser;
use std::path::PathBuf;

/// Output format for answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// SQL followed by an aligned result table.
    #[default]
    Text,
    /// A JSON document with SQL, records and the attempt history.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Ask questions about a SQLite database in plain language.
#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Database path, sqlite://<path>, or sqlite::memory:
    #[arg(value_name = "DATABASE")]
    pub database: Option<String>,

    /// Use named connection from config
    #[arg(short = 'c', long, value_name = "NAME")]
    pub connection: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Question to answer; read from stdin when omitted
    #[arg(short = 'q', long, value_name = "QUESTION")]
    pub question: Option<String>,

    /// Generation provider: gemini, openai or mock
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Model name (defaults to the provider's default)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// API key for the generation provider
    #[arg(long, value_name = "KEY", env = "DB_ASK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum attempts per question
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Allow INSERT/UPDATE/DELETE and DDL statements
    #[arg(long)]
    pub allow_mutations: bool,

    /// Output format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: String,

    /// Print the introspected schema and exit
    #[arg(long)]
    pub schema: bool,

    /// Print suggested starter questions and exit
    #[arg(long)]
    pub suggest: bool,

    /// Explain the generated SQL in plain language
    #[arg(long)]
    pub explain: bool,

    /// Write logs to a file instead of stderr (default: platform state directory)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Converts the positional database argument to a ConnectionConfig.
    pub fn to_connection_config(&self) -> Result<Option<ConnectionConfig>> {
        self.database
            .as_deref()
            .map(ConnectionConfig::from_connection_string)
            .transpose()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the log file to write to, if file logging was requested.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(crate::logging::default_log_path))
    }

    /// Returns the named connection to use, if specified.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn parse_output_format(&self) -> Result<OutputFormat> {
        self.format.parse().map_err(AskError::config)
    }

    /// Parses --provider, if given.
    pub fn parse_provider(&self) -> Result<Option<LlmProvider>> {
        self.provider
            .as_deref()
            .map(|p| p.parse().map_err(AskError::config))
            .transpose()
    }

    /// Applies CLI overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(provider) = self.parse_provider()? {
            config.llm.provider = provider;
        }
        if let Some(model) = &self.model {
            config.llm.model = Some(model.clone());
        }
        if let Some(max_attempts) = self.max_attempts {
            config.pipeline.max_attempts = max_attempts;
        }
        if self.allow_mutations {
            config.pipeline.allow_mutations = true;
        }
        Ok(())
    }
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: positional database, then the named connection, then the
/// `default` connection, then `DB_ASK_DATABASE`.
pub fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = Some(config.get_connection(Some(name)).cloned().ok_or_else(|| {
                AskError::config(format!("Connection '{name}' not found in config file"))
            })?);
        }
    }

    let mut connection = connection
        .or_else(|| config.get_connection(None).cloned())
        .unwrap_or_default();
    connection.apply_env_defaults();

    if config.pipeline.allow_mutations {
        connection.read_only = false;
    }

    Ok(connection)
}
