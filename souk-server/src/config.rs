//! Configuration system for the souk server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/souk/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    messaging: MessagingFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_frame_size: Option<usize>,
}

/// `[messaging]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct MessagingFileConfig {
    send_cooldown_ms: Option<u64>,
    ack_timeout_ms: Option<u64>,
    typing_ttl_ms: Option<u64>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
    inbox_preview_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "souk marketplace messaging server")]
pub struct CliArgs {
    /// Address to bind the HTTP and push-channel listener to.
    #[arg(short, long, env = "SOUK_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/souk/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum push-channel frame size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Per-sender cooldown between two sends, in milliseconds.
    #[arg(long, env = "SOUK_SEND_COOLDOWN_MS")]
    pub send_cooldown_ms: Option<u64>,

    /// How long to wait for a delivery acknowledgment, in milliseconds.
    #[arg(long, env = "SOUK_ACK_TIMEOUT_MS")]
    pub ack_timeout_ms: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SOUK_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Tunables of the messaging core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    /// Minimum spacing between two sends by the same sender.
    pub send_cooldown: Duration,
    /// Bounded wait for the receiver's delivery acknowledgment.
    pub ack_timeout: Duration,
    /// Typing entries older than this read as "not typing".
    pub typing_ttl: Duration,
    /// Page size when the caller gives none.
    pub default_page_size: usize,
    /// Upper clamp for requested page sizes.
    pub max_page_size: usize,
    /// Number of conversations in the lightweight inbox preview.
    pub inbox_preview_size: usize,
    /// Maximum accepted push-channel frame size in bytes.
    pub max_frame_size: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            send_cooldown: Duration::from_millis(1200),
            ack_timeout: Duration::from_millis(2500),
            typing_ttl: Duration::from_secs(5),
            default_page_size: 30,
            max_page_size: 100,
            inbox_preview_size: 5,
            max_frame_size: 64 * 1024,
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:8080`).
    pub bind_addr: String,
    /// Messaging core tunables.
    pub messaging: MessagingConfig,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            messaging: MessagingConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let msg = &file.messaging;
        let base = defaults.messaging;

        let millis = |cli_value: Option<u64>, file_value: Option<u64>, default: Duration| {
            cli_value
                .or(file_value)
                .map_or(default, Duration::from_millis)
        };

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            messaging: MessagingConfig {
                send_cooldown: millis(
                    cli.send_cooldown_ms,
                    msg.send_cooldown_ms,
                    base.send_cooldown,
                ),
                ack_timeout: millis(cli.ack_timeout_ms, msg.ack_timeout_ms, base.ack_timeout),
                typing_ttl: millis(None, msg.typing_ttl_ms, base.typing_ttl),
                default_page_size: msg.default_page_size.unwrap_or(base.default_page_size),
                max_page_size: msg.max_page_size.unwrap_or(base.max_page_size).max(1),
                inbox_preview_size: msg.inbox_preview_size.unwrap_or(base.inbox_preview_size),
                max_frame_size: cli
                    .max_frame_size
                    .or(file.server.max_frame_size)
                    .unwrap_or(base.max_frame_size),
            },
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("souk").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
