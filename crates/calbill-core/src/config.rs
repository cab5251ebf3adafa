use config::Config;
use serde::Deserialize;

use crate::constants::DEFAULT_ITEM;
use crate::error::CoreResult;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub billing: BillingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Hourly rate seeded into every new customer group.
    pub hourly_rate: f64,
    /// Item label seeded into every new customer group.
    pub default_item: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from environment variables and an optional
    /// `config.toml` into a `Settings`. Environment variables take precedence
    /// over file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> CoreResult<Self> {
        Ok(Config::builder()
            .set_default("billing.hourly_rate", 0.0)?
            .set_default("billing.default_item", DEFAULT_ITEM)?
            .set_default("logging.level", "info")?
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Self>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> CoreResult<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
