use std::path::PathBuf;
use std::time::Duration;

use quantdesk_engine::PollSchedule;

/// Configuration loaded from environment variables.
///
/// All fields except `DATABASE_URL` have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Postgres connection string (required).
    pub database_url: String,
    /// Base HTTP URL of the execution service.
    pub executor_url: String,
    /// WebSocket base URL of the change-notification stream.
    pub realtime_url: String,
    /// Path of the local device-state file.
    pub state_path: PathBuf,
    /// Polling intervals and deadline for job status checks.
    pub poll: PollSchedule,
    /// Session validation cadence.
    pub validation_interval: Duration,
    /// Auth-signal debounce window.
    pub debounce_window: Duration,
}

/// Configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl DeskConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                      |
    /// |---------------------------|------------------------------|
    /// | `DATABASE_URL`            | (required)                   |
    /// | `EXECUTOR_URL`            | `http://localhost:8700`      |
    /// | `REALTIME_URL`            | `ws://localhost:8701`        |
    /// | `STATE_PATH`              | `.quantdesk/state.json`      |
    /// | `SESSION_VALIDATION_SECS` | `60`                         |
    /// | `AUTH_DEBOUNCE_MS`        | `200`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let executor_url =
            std::env::var("EXECUTOR_URL").unwrap_or_else(|_| "http://localhost:8700".into());

        let realtime_url =
            std::env::var("REALTIME_URL").unwrap_or_else(|_| "ws://localhost:8701".into());

        let state_path = std::env::var("STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".quantdesk/state.json"));

        let validation_interval =
            Duration::from_secs(parse_var("SESSION_VALIDATION_SECS", 60)?);
        let debounce_window = Duration::from_millis(parse_var("AUTH_DEBOUNCE_MS", 200)?);

        Ok(Self {
            database_url,
            executor_url,
            realtime_url,
            state_path,
            poll: PollSchedule::default(),
            validation_interval,
            debounce_window,
        })
    }
}

fn parse_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}
