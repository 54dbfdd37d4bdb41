use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub stripe: StripeSettings,
    pub checkout: CheckoutSettings,
    pub tax: TaxSettings,
    pub fees: FeeSettings,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Rate limiting is off when no URL is configured.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StripeSettings {
    /// Empty means payments are not configured
    #[serde(default)]
    pub secret_key: String,
    pub api_version: Option<String>,
    #[serde(default = "default_stripe_timeout")]
    pub timeout_ms: u64,
}

fn default_stripe_timeout() -> u64 {
    10_000
}

impl StripeSettings {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutSettings {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_delivery_fee")]
    pub default_delivery_fee_cents: i64,
}

fn default_currency() -> String {
    "usd".into()
}

fn default_delivery_fee() -> i64 {
    499
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaxSettings {
    pub default_rate: f64,
    #[serde(default)]
    pub state_rates: HashMap<String, f64>,
    #[serde(default)]
    pub alcohol_surcharge_rates: HashMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeeSettings {
    pub commission_percent: f64,
    #[serde(default)]
    pub fixed_fee_cents: i64,
    #[serde(default)]
    pub state_overrides: HashMap<String, FeeOverride>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FeeOverride {
    pub commission_percent: f64,
    #[serde(default)]
    pub fixed_fee_cents: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. BARCART__STRIPE__SECRET_KEY=sk_live_...
            .add_source(config::Environment::with_prefix("BARCART").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_deserializes() {
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.checkout.default_delivery_fee_cents, 499);
        assert_eq!(cfg.checkout.currency, "usd");
        assert!(!cfg.stripe.is_configured());
        assert!(cfg.redis.url.is_none());
        assert!(cfg.tax.default_rate > 0.0);
    }

    #[test]
    fn test_fee_overrides_from_toml() {
        let toml = r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/barcart"
            [stripe]
            secret_key = "sk_test_123"
            [checkout]
            [tax]
            default_rate = 8.0
            [fees]
            commission_percent = 10.0
            [fees.state_overrides.NY]
            commission_percent = 12.5
            fixed_fee_cents = 30
        "#;
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(cfg.stripe.is_configured());
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.rate_limit.requests_per_minute, 100);
        let (_, ny) = cfg
            .fees
            .state_overrides
            .iter()
            .find(|(state, _)| state.eq_ignore_ascii_case("ny"))
            .unwrap();
        assert_eq!(*ny, FeeOverride { commission_percent: 12.5, fixed_fee_cents: 30 });
    }
}
