use serde::Deserialize;

use crate::models::product::Product;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Tracked product ids. Order matters: restore picks the first valid one.
    pub product_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Replay the current entitlements to the observer before listening for updates
    #[serde(default = "default_sync_entitlements_on_start")]
    pub sync_entitlements_on_start: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            sync_entitlements_on_start: default_sync_entitlements_on_start(),
        }
    }
}

fn default_sync_entitlements_on_start() -> bool {
    true
}

/// Catalog and behavior of the in-memory sandbox authority
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_supports_purchase")]
    pub supports_purchase: bool,
    #[serde(default)]
    pub fail_catalog: bool,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            supports_purchase: default_supports_purchase(),
            fail_catalog: false,
            products: Vec::new(),
        }
    }
}

fn default_supports_purchase() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("STOREHELPER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("store.product_ids"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parse a YAML document without touching the environment
    pub fn from_yaml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
