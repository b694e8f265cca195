//! Configuration management
//!
//! Layered the same way as the rest of the `config` crate ecosystem: a
//! `barq.toml` file (optional) overridden by `BARQ_`-prefixed environment
//! variables, overridden in turn by CLI flags in `main.rs`.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_containers")]
    pub max_containers: usize,

    #[serde(default = "default_container_ttl_secs")]
    pub container_ttl_secs: u64,

    #[serde(default = "default_network_mode")]
    pub network_mode: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_containers: default_max_containers(),
            container_ttl_secs: default_container_ttl_secs(),
            network_mode: default_network_mode(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_allowed_origins() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_containers() -> usize {
    10
}

fn default_container_ttl_secs() -> u64 {
    300
}

fn default_network_mode() -> String {
    "bridge".to_string()
}

impl Config {
    #[allow(dead_code)]
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("barq").required(false))
            .add_source(config::Environment::with_prefix("BARQ").separator("_"))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}
