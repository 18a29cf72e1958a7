//! Attestor configuration file handling
//!
//! Provides default configuration generation and loading for the attestor CLI.
//! Configuration files are TOML and live in the attestor data directory.
//!
//! ## Network presets
//!
//! The selected network decides the minimum deposits and the confirmation
//! depth. Each can be overridden individually in the `[ledger]` table.
//!
//! ## Validation
//!
//! Retry bounds are enforced here, before anything reaches the core:
//! `max_attempts` in 1..=10 and delays in 100ms..=30s.

use attestor::ledger::types::Amount;
use attestor::{Deposits, FailureMode, LedgerError, LedgerResult, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Funding balance of a freshly created simulated ledger
const DEFAULT_INITIAL_BALANCE: u64 = 1_000_000;

const MIN_ATTEMPTS: u32 = 1;
const MAX_ATTEMPTS: u32 = 10;
const MIN_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Ledger network selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Local,
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    /// Minimum deposits required by this network.
    pub fn deposits(&self) -> Deposits {
        match self {
            Self::Local => Deposits {
                subject: 100,
                relationship: 50,
            },
            Self::Testnet => Deposits {
                subject: 1_000,
                relationship: 500,
            },
            Self::Mainnet => Deposits {
                subject: 100_000,
                relationship: 50_000,
            },
        }
    }

    /// Blocks a transaction must be buried under to count as confirmed.
    pub fn confirmation_depth(&self) -> u64 {
        match self {
            Self::Local => 0,
            Self::Testnet => 1,
            Self::Mainnet => 3,
        }
    }
}

/// Attestor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttestorConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger connection and economics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub network: Network,

    /// File holding the funding credential. Opaque to the attestor; only the
    /// ledger gateway reads it.
    pub funding_key_file: Option<PathBuf>,

    /// Overrides the network's subject deposit
    pub subject_deposit: Option<u64>,

    /// Overrides the network's relationship deposit
    pub relationship_deposit: Option<u64>,

    /// Overrides the network's confirmation depth
    pub confirmation_depth: Option<u64>,

    /// Funding balance of a new simulated ledger
    pub initial_balance: Option<u64>,
}

/// Retry policy, as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (e.g. "500ms")
    #[serde(default = "default_base_delay")]
    pub base_delay: String,

    /// Upper bound for exponential delays (e.g. "10s")
    #[serde(default = "default_max_delay")]
    pub max_delay: String,

    #[serde(default = "default_exponential")]
    pub exponential: bool,
}

/// Orchestration settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub failure_mode: FailureMode,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_attempts() -> u32 {
    attestor::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay() -> String {
    humantime::format_duration(attestor::retry::DEFAULT_BASE_DELAY).to_string()
}

fn default_max_delay() -> String {
    humantime::format_duration(attestor::retry::DEFAULT_MAX_DELAY).to_string()
}

fn default_exponential() -> bool {
    true
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            exponential: default_exponential(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Parse a humantime duration and check it against the accepted delay range.
pub fn parse_delay(field: &str, value: &str) -> LedgerResult<Duration> {
    let delay = humantime::parse_duration(value.trim()).map_err(|e| {
        LedgerError::invalid_input(format!("retry.{}: invalid duration '{}': {}", field, value, e))
    })?;
    if !(MIN_DELAY..=MAX_DELAY).contains(&delay) {
        return Err(LedgerError::invalid_input(format!(
            "retry.{} must be between {} and {}, got {}",
            field,
            humantime::format_duration(MIN_DELAY),
            humantime::format_duration(MAX_DELAY),
            humantime::format_duration(delay)
        )));
    }
    Ok(delay)
}

impl RetryConfig {
    /// Validate and convert into the core's retry policy.
    pub fn policy(&self) -> LedgerResult<RetryPolicy> {
        if !(MIN_ATTEMPTS..=MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(LedgerError::invalid_input(format!(
                "retry.max_attempts must be between {} and {}, got {}",
                MIN_ATTEMPTS, MAX_ATTEMPTS, self.max_attempts
            )));
        }
        let base_delay = parse_delay("base_delay", &self.base_delay)?;
        let max_delay = parse_delay("max_delay", &self.max_delay)?;
        if base_delay > max_delay {
            return Err(LedgerError::invalid_input(format!(
                "retry.base_delay ({}) exceeds retry.max_delay ({})",
                self.base_delay, self.max_delay
            )));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay,
            exponential: self.exponential,
            max_delay,
        })
    }
}

impl LedgerConfig {
    pub fn deposits(&self) -> Deposits {
        let preset = self.network.deposits();
        Deposits {
            subject: self.subject_deposit.map_or(preset.subject, Amount::from),
            relationship: self
                .relationship_deposit
                .map_or(preset.relationship, Amount::from),
        }
    }

    pub fn confirmation_depth(&self) -> u64 {
        self.confirmation_depth
            .unwrap_or_else(|| self.network.confirmation_depth())
    }

    pub fn initial_balance(&self) -> Amount {
        Amount::from(self.initial_balance.unwrap_or(DEFAULT_INITIAL_BALANCE))
    }
}

impl AttestorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: AttestorConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(funding_key_file: &Path) -> String {
        format!(
            r#"# Attestor Configuration
#
# Links project contributors to subjects and relationships on the ledger.
# Every setting below has a default; uncomment to override.

[ledger]
# Network: "local", "testnet" or "mainnet".
# Selects the minimum deposits and the confirmation depth.
network = "testnet"

# File holding the funding credential (handed to the ledger gateway only).
funding_key_file = "{funding_key_file}"

# Per-network overrides
# subject_deposit = 1000
# relationship_deposit = 500
# confirmation_depth = 1

# Funding balance of a newly created simulated ledger
# initial_balance = 1000000

[retry]
# Attempts per ledger operation, including the first (1-10)
max_attempts = 3

# Delays between attempts (100ms - 30s)
base_delay = "500ms"
max_delay = "10s"
exponential = true

[run]
# "abort": the first failing contributor ends the run
# "continue": failing contributors are recorded and skipped
failure_mode = "continue"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"
"#,
            funding_key_file = funding_key_file.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        funding_key_file: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(funding_key_file);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Attestor data directory (e.g. ~/.local/share/attestor)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attestor")
}

/// Default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Default funding credential path, adjacent to the config
pub fn default_funding_key_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(config_path)
        .join("funding.key")
}
