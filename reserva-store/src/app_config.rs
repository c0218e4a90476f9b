use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Tunables for the hold/confirm flow. Defaults match the engine's
/// documented behavior; deployments override per environment.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,
    #[serde(default = "default_code_digits")]
    pub code_digits: u32,
    #[serde(default = "default_code_attempts")]
    pub code_max_attempts: u32,
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_alternatives_limit")]
    pub alternatives_limit: usize,
}

fn default_hold_ttl() -> u64 { 900 }
fn default_sweep_interval() -> u64 { 300 }
fn default_code_prefix() -> String { "RSV-".to_string() }
fn default_code_digits() -> u32 { 6 }
fn default_code_attempts() -> u32 { 10 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_base_delay() -> u64 { 100 }
fn default_alternatives_limit() -> usize { 3 }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: default_hold_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            code_prefix: default_code_prefix(),
            code_digits: default_code_digits(),
            code_max_attempts: default_code_attempts(),
            retry_max_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            alternatives_limit: default_alternatives_limit(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overlay, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `RESERVA__DATABASE__URL=...`
            .add_source(config::Environment::with_prefix("RESERVA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
