//! Typed configuration, layered from a file plus environment overrides.
//!
//! Mirrors the enumerated fields of spec §6. Loaded with the `config` crate
//! the way `FelixEngl-atra` layers its `config::Config` builder: a base file
//! (`config/default.toml`) overridden by `SHORTLINK_*` environment
//! variables.

use serde::Deserialize;
use std::collections::HashSet;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_route_prefix")]
    pub base_route_prefix: String,

    pub link_domain: String,

    #[serde(default)]
    pub use_ssl: bool,

    #[serde(default)]
    pub domain_whitelist: HashSet<String>,

    #[serde(default = "default_favicon")]
    pub default_favicon: String,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    pub max_links_per_group: i64,

    #[serde(default)]
    pub enable_sharding: bool,

    pub broker: BrokerConfig,
    pub kv: KvConfig,
    pub db: DbConfig,
}

/// Message broker connection settings (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub name_server: String,
    pub topics: Vec<String>,
    pub namespace: String,
    pub consumer_group: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// KV store connection settings (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct KvConfig {
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
}

/// Relational store connection settings (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub dsn: String,
    #[serde(default)]
    pub enable_sharding: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_route_prefix() -> String {
    "/api/short-link/v1".to_string()
}

fn default_favicon() -> String {
    "https://shortlink.example.com/favicon.ico".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

impl Config {
    /// Load configuration from `config/default.toml` (or the path named by
    /// `SHORTLINK_CONFIG`), overridden by `SHORTLINK__`-prefixed environment
    /// variables (double underscore separates nesting, e.g.
    /// `SHORTLINK__KV__ADDR`).
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var("SHORTLINK_CONFIG").unwrap_or_else(|_| "config/default.toml".into());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("SHORTLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn redirect_base(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.link_domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_base_respects_ssl_flag() {
        let cfg = Config {
            port: 8080,
            base_route_prefix: "/api".into(),
            link_domain: "s.example.com".into(),
            use_ssl: true,
            domain_whitelist: HashSet::new(),
            default_favicon: String::new(),
            max_attempts: 10,
            max_links_per_group: 100,
            enable_sharding: false,
            broker: BrokerConfig {
                name_server: "n".into(),
                topics: vec![],
                namespace: "ns".into(),
                consumer_group: "cg".into(),
                access_key: None,
                secret_key: None,
            },
            kv: KvConfig {
                addr: "redis://localhost".into(),
                username: None,
                password: None,
                db: 0,
            },
            db: DbConfig {
                dsn: "postgres://localhost".into(),
                enable_sharding: false,
            },
        };
        assert_eq!(cfg.redirect_base(), "https://s.example.com");
    }
}
