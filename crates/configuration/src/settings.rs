use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub supervisor: SupervisorSettings,
    pub logging: LoggingSettings,
}

/// Where and as whom to connect to MySQL.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// The database (schema) name holding the `products` table.
    pub name: String,
}

// The password never reaches logs or the `config` command output.
impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"********")
            .field("name", &self.name)
            .finish()
    }
}

/// Contains parameters for the HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
}

/// Timings of the connection supervisor's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// How long to wait after process start before the first connection attempt.
    pub startup_delay: Duration,
    /// Fixed pause between a failed handshake and the next attempt.
    pub retry_delay: Duration,
    /// How often an established connection is pinged.
    pub liveness_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(3),
            retry_delay: Duration::from_secs(5),
            liveness_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

/// The flat key space shared by the environment (`DB_HOST` -> `db_host`) and
/// the optional `inventory.toml` file.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSettings {
    db_host: String,
    db_port: u16,
    db_user: String,
    db_password: String,
    db_name: String,
    port: u16,
    db_startup_delay_secs: u64,
    db_retry_delay_secs: u64,
    db_liveness_interval_secs: u64,
    #[serde(default)]
    log_dir: Option<PathBuf>,
}

impl TryFrom<RawSettings> for Settings {
    type Error = ConfigError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        if raw.db_host.trim().is_empty() {
            return Err(ConfigError::ValidationError("DB_HOST must not be empty".to_string()));
        }
        if raw.db_name.trim().is_empty() {
            return Err(ConfigError::ValidationError("DB_NAME must not be empty".to_string()));
        }
        if raw.port == 0 || raw.db_port == 0 {
            return Err(ConfigError::ValidationError("ports must be non-zero".to_string()));
        }
        if raw.db_retry_delay_secs == 0 || raw.db_liveness_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "DB_RETRY_DELAY_SECS and DB_LIVENESS_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database: DatabaseSettings {
                host: raw.db_host,
                port: raw.db_port,
                user: raw.db_user,
                password: raw.db_password,
                name: raw.db_name,
            },
            server: ServerSettings { port: raw.port },
            supervisor: SupervisorSettings {
                startup_delay: Duration::from_secs(raw.db_startup_delay_secs),
                retry_delay: Duration::from_secs(raw.db_retry_delay_secs),
                liveness_interval: Duration::from_secs(raw.db_liveness_interval_secs),
            },
            logging: LoggingSettings {
                directory: raw.log_dir.filter(|dir| !dir.as_os_str().is_empty()),
            },
        })
    }
}
