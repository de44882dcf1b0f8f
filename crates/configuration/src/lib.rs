use crate::error::ConfigError;
use crate::settings::RawSettings;
use config::builder::DefaultState;
use config::ConfigBuilder;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{DatabaseSettings, LoggingSettings, ServerSettings, Settings, SupervisorSettings};

/// Loads the service configuration.
///
/// Sources are layered, later ones winning: hardcoded defaults, an optional
/// `inventory.toml` next to the binary, then the process environment (after
/// merging a `.env` file, if one exists). Environment keys are the classic
/// `DB_HOST`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` and `PORT`.
pub fn load_settings() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let builder = with_defaults(config::Config::builder())?
        .add_source(config::File::with_name("inventory").required(false))
        .add_source(config::Environment::default());

    settings_from(builder.build()?)
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    builder
        .set_default("db_host", "localhost")?
        .set_default("db_port", 3306_i64)?
        .set_default("db_user", "root")?
        .set_default("db_password", "password")?
        .set_default("db_name", "inventory_db")?
        .set_default("port", 3000_i64)?
        .set_default("db_startup_delay_secs", 3_i64)?
        .set_default("db_retry_delay_secs", 5_i64)?
        .set_default("db_liveness_interval_secs", 30_i64)
}

fn settings_from(source: config::Config) -> Result<Settings, ConfigError> {
    let raw = source.try_deserialize::<RawSettings>()?;
    Settings::try_from(raw)
}
