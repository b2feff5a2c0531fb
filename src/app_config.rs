use serde::Deserialize;
use std::env;

// ============================================================================
// Configuration
// ============================================================================
//
// Layers, later wins:
//   built-in defaults
//   config/default.toml        (optional)
//   config/{RUN_MODE}.toml     (optional, RUN_MODE defaults to development)
//   DELIVERY_* environment     (e.g. DELIVERY_STORE__BACKEND=postgres)
//
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub payment: PaymentConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub currency: String,
    /// Source tokens the sandbox gateway declines.
    #[serde(default)]
    pub declined_tokens: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Page size used when walking READY orders.
    pub ready_page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset.
    pub filter: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("store.backend", "memory")?
            .set_default("store.max_connections", 10)?
            .set_default("payment.currency", "usd")?
            .set_default("payment.declined_tokens", Vec::<String>::new())?
            .set_default("dispatch.ready_page_size", 50)?
            .set_default("logging.filter", "info,delivery_orders=debug")?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                config::Environment::with_prefix("DELIVERY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("payment.declined_tokens"),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() {
        let config = Config::load().unwrap();
        assert!(config.server.port > 0);
        assert!(config.dispatch.ready_page_size > 0);
        assert!(!config.payment.currency.is_empty());
    }

    #[test]
    fn test_backend_names() {
        let backend: StoreBackend = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(backend, StoreBackend::Postgres);
        assert!(serde_json::from_str::<StoreBackend>("\"scylla\"").is_err());
    }
}
