use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cart_rules: CartRules,
}

/// Tunables for the reservation/cart lifecycle. Defaults match the policy:
/// 15-minute holds, 7/30-day cart expiry, cleanup every 2 and 5 minutes.
#[derive(Debug, Deserialize, Clone)]
pub struct CartRules {
    #[serde(default = "default_hold_seconds")]
    pub reservation_hold_seconds: u64,
    #[serde(default = "default_reservation_cleanup_seconds")]
    pub reservation_cleanup_interval_seconds: u64,
    #[serde(default = "default_cart_sweep_seconds")]
    pub cart_sweep_interval_seconds: u64,
}

fn default_hold_seconds() -> u64 {
    velora_core::reservation::DEFAULT_HOLD_SECONDS
}
fn default_reservation_cleanup_seconds() -> u64 {
    120
}
fn default_cart_sweep_seconds() -> u64 {
    300
}

impl Default for CartRules {
    fn default() -> Self {
        Self {
            reservation_hold_seconds: default_hold_seconds(),
            reservation_cleanup_interval_seconds: default_reservation_cleanup_seconds(),
            cart_sweep_interval_seconds: default_cart_sweep_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // E.g. `VELORA__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("VELORA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
