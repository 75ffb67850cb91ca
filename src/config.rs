use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collab::{policy, CollabPolicy};

/// Upper bound for every collaboration timeout (7 days)
pub const MAX_TIMEOUT_SECS: i64 = 7 * 24 * 60 * 60;

/// Upper bound for the sweep period (1 day)
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Idle time after which a participant is evicted
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: i64,

    /// Field lock lifetime between renewals
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: i64,

    #[serde(default = "default_typing_timeout_secs")]
    pub typing_timeout_secs: i64,

    #[serde(default = "default_conflict_window_secs")]
    pub conflict_window_secs: i64,

    #[serde(default = "default_conflict_scan_depth")]
    pub conflict_scan_depth: usize,

    /// How often the expiry sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file.
    /// Runs before tracing is initialized, so the caller reports the outcome.
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        let config = envy::from_env::<Config>().map_err(ConfigError::EnvError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("SESSION_TIMEOUT_SECS", self.session_timeout_secs),
            ("LOCK_TIMEOUT_SECS", self.lock_timeout_secs),
            ("TYPING_TIMEOUT_SECS", self.typing_timeout_secs),
            ("CONFLICT_WINDOW_SECS", self.conflict_window_secs),
        ];
        for (name, secs) in timeouts {
            if secs <= 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
            if secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_TIMEOUT_SECS
                )));
            }
        }
        if self.conflict_scan_depth == 0 {
            return Err(ConfigError::Invalid(
                "CONFLICT_SCAN_DEPTH must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 || self.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "SWEEP_INTERVAL_SECS must be between 1 and {}",
                MAX_SWEEP_INTERVAL_SECS
            )));
        }
        Ok(())
    }

    /// Fallback tracing filter used when `RUST_LOG` is not set
    pub fn log_filter(&self) -> String {
        let level = self.log_level.trim().to_lowercase();
        format!(
            "staffhub_collab={0},tower_http={0},axum::rejection=trace,{0}",
            level
        )
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Timeouts and conflict heuristics for the coordinator
    pub fn policy(&self) -> CollabPolicy {
        CollabPolicy {
            session_timeout: chrono::Duration::seconds(self.session_timeout_secs),
            lock_timeout: chrono::Duration::seconds(self.lock_timeout_secs),
            typing_timeout: chrono::Duration::seconds(self.typing_timeout_secs),
            conflict_window: chrono::Duration::seconds(self.conflict_window_secs),
            conflict_scan_depth: self.conflict_scan_depth,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            session_timeout_secs: default_session_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            typing_timeout_secs: default_typing_timeout_secs(),
            conflict_window_secs: default_conflict_window_secs(),
            conflict_scan_depth: default_conflict_scan_depth(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_session_timeout_secs() -> i64 {
    policy::SESSION_TIMEOUT_SECS
}

fn default_lock_timeout_secs() -> i64 {
    policy::LOCK_TIMEOUT_SECS
}

fn default_typing_timeout_secs() -> i64 {
    policy::TYPING_TIMEOUT_SECS
}

fn default_conflict_window_secs() -> i64 {
    policy::CONFLICT_WINDOW_SECS
}

fn default_conflict_scan_depth() -> usize {
    policy::CONFLICT_SCAN_DEPTH
}

fn default_sweep_interval_secs() -> u64 {
    60
}
