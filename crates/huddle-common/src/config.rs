//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call huddle_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("reconnect.base_delay_ms", 1_000)?
        .set_default("reconnect.max_delay_ms", 10_000)?
        .set_default("reconnect.max_attempts", 5)?
        .set_default("quality.sample_interval_ms", 2_000)?
        .set_default("limits.max_message_length", 4_000)?
        .set_default("limits.max_display_name_length", 64)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (HUDDLE_SERVER__HOST, HUDDLE_RECONNECT__MAX_ATTEMPTS, etc.)
        .add_source(
            config::Environment::with_prefix("HUDDLE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub quality: QualityConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Transport reconnection policy (client side).
#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    /// First retry delay; doubled on each subsequent attempt.
    pub base_delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
    /// Attempts before giving up and entering the terminal error state.
    pub max_attempts: u32,
}

/// Connection-quality sampling.
#[derive(Debug, Deserialize, Clone)]
pub struct QualityConfig {
    pub sample_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_message_length: usize,
    pub max_display_name_length: usize,
}
