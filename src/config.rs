//! Configuration module for car-socket.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over built-in defaults.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::BrandArgument;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "car-socket")]
#[command(version)]
#[command(about = "Line-oriented TCP command server and interactive client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Accept connections and serve commands
    Server(ServerArgs),
    /// Connect to a server and send commands typed on stdin
    Client(ClientArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Address to bind to (e.g., 0.0.0.0:5000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Seconds without a command before a connection is closed (0 = never)
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Brand lookup backend
    #[arg(long, value_enum)]
    pub backend: Option<LookupBackend>,

    /// Car API key
    #[arg(long, env = "CAR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Lookup timeout in milliseconds
    #[arg(long)]
    pub lookup_timeout_ms: Option<u64>,

    /// Which part of the CAR argument is used as the brand
    #[arg(long, value_enum)]
    pub brand_argument: Option<BrandArgument>,
}

#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Host to connect to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to connect to
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Available brand lookup backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum LookupBackend {
    /// Built-in or configured brand table
    #[default]
    Table,
    /// HTTP car information API
    CarApi,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub lookup: LookupSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Per-connection configuration
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    /// Idle timeout in seconds (0 = disabled)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Brand lookup configuration
#[derive(Debug, Deserialize)]
pub struct LookupSection {
    #[serde(default)]
    pub backend: LookupBackend,
    #[serde(default = "default_api_url")]
    pub url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_lookup_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub brand_argument: BrandArgument,
    /// Brand table entries for the `table` backend
    #[serde(default)]
    pub brands: HashMap<String, String>,
}

impl Default for LookupSection {
    fn default() -> Self {
        Self {
            backend: LookupBackend::default(),
            url: default_api_url(),
            api_key: None,
            timeout_ms: default_lookup_timeout_ms(),
            brand_argument: BrandArgument::default(),
            brands: HashMap::new(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_api_url() -> String {
    "https://api.api-ninjas.com/v1/cars".to_string()
}

fn default_lookup_timeout_ms() -> u64 {
    5_000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which side of the protocol this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: String,
    pub workers: Option<usize>,
    pub max_connections: usize,
    pub idle_timeout: Option<Duration>,
}

/// Resolved lookup settings
#[derive(Debug, Clone)]
pub struct LookupSettings {
    pub backend: LookupBackend,
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub brand_argument: BrandArgument,
    pub brands: HashMap<String, String>,
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub server: ServerSettings,
    pub lookup: LookupSettings,
    pub client: ClientSettings,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI args over TOML values.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let (role, server_args, client_args) = match cli.command {
            Mode::Server(args) => (Role::Server, args, ClientArgs::default()),
            Mode::Client(args) => (Role::Client, ServerArgs::default(), args),
        };

        let idle_timeout = server_args
            .idle_timeout
            .unwrap_or(toml_config.session.idle_timeout);

        Config {
            role,
            server: ServerSettings {
                listen: server_args.listen.unwrap_or(toml_config.server.listen),
                workers: server_args.workers.or(toml_config.server.workers),
                max_connections: server_args
                    .max_connections
                    .unwrap_or(toml_config.server.max_connections),
                idle_timeout: (idle_timeout > 0).then(|| Duration::from_secs(idle_timeout)),
            },
            lookup: LookupSettings {
                backend: server_args.backend.unwrap_or(toml_config.lookup.backend),
                url: toml_config.lookup.url,
                api_key: server_args.api_key.or(toml_config.lookup.api_key),
                timeout: Duration::from_millis(
                    server_args
                        .lookup_timeout_ms
                        .unwrap_or(toml_config.lookup.timeout_ms),
                ),
                brand_argument: server_args
                    .brand_argument
                    .unwrap_or(toml_config.lookup.brand_argument),
                brands: toml_config.lookup.brands,
            },
            client: ClientSettings {
                host: client_args.host.unwrap_or(toml_config.client.host),
                port: client_args.port.unwrap_or(toml_config.client.port),
            },
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.role == Role::Client {
            return Ok(());
        }

        self.server
            .listen
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("listen '{}': {e}", self.server.listen)))?;

        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.lookup.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "lookup timeout must be greater than 0".to_string(),
            ));
        }
        if let Some(idle) = self.server.idle_timeout {
            if self.lookup.timeout > idle {
                return Err(ConfigError::Invalid(format!(
                    "lookup timeout ({:?}) exceeds idle timeout ({:?})",
                    self.lookup.timeout, idle
                )));
            }
        }
        if self.lookup.backend == LookupBackend::CarApi
            && self.lookup.api_key.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::Invalid(
                "car_api backend requires an api key (--api-key or CAR_API_KEY)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
