use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub processor: ProcessorConfig,
    pub blockchain: BlockchainConfig,
    pub consumption: ConsumptionConfig,
    pub checkout: CheckoutConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests still running after this are answered with 408
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the service that issues access tokens
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    pub webhook_secret: String,
    /// When false, events flagged as test mode are dropped before resolution
    #[serde(default)]
    pub accept_test_events: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainConfig {
    pub rpc_url: String,
    pub receiving_address: String,
    /// Currency code used to look up the expected amount in the catalog
    pub currency: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    pub min_confirmations: u64,
    pub request_timeout_ms: u64,
}

fn default_decimals() -> u32 {
    18
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumptionConfig {
    /// Upper bound on waiting for another writer on the same account
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    pub ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub products: Vec<ProductConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    pub variant: String,
    pub turns_granted: i32,
    /// Variant identifier as reported by the payment processor, if it differs
    #[serde(default)]
    pub processor_variant_id: Option<String>,
    /// Expected payment amount per currency code
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // config.yml is required; environment variables override it
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("TURNLEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
