//! Process configuration: figment layers a TOML file under environment
//! variables, with a typed `ServerConfig` struct holding a nested
//! [`wagate_data::DbConfig`] for the persistence layer's own settings.

use std::path::Path;
use std::sync::OnceLock;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::Deserialize;
use wagate_data::DbConfig;

static CONFIG: OnceLock<ServerConfig> = OnceLock::new();

/// The process-wide configuration, set once by `main` right after [`load`].
pub fn get() -> &'static ServerConfig {
    CONFIG.get().expect("config::set must run before config::get")
}

pub fn set(config: ServerConfig) {
    CONFIG.set(config).ok().expect("config::set must run only once");
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_owned()
}
fn default_api_prefix() -> String {
    "/api/v1".to_owned()
}
fn default_rust_log() -> String {
    "info".to_owned()
}
fn default_log_format() -> String {
    "fmt".to_owned()
}
fn default_qr_wait_seconds() -> u64 {
    60
}
fn default_connect_wait_seconds() -> u64 {
    20
}
fn default_warmup_wait_seconds() -> u64 {
    15
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    pub secret_key: String,
    pub db: DbConfig,
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_qr_wait_seconds")]
    pub qr_wait_seconds: u64,
    #[serde(default = "default_connect_wait_seconds")]
    pub connect_wait_seconds: u64,
    #[serde(default = "default_warmup_wait_seconds")]
    pub warmup_wait_seconds: u64,
}

/// Loads `PORT` / `DATABASE_URL` / `SECRET_KEY` and friends, failing fast if
/// a required value is missing.
pub fn load(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    dotenvy::dotenv().ok();

    let mut figment = Figment::new();
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment
        .merge(Serialized::default("db.url", required_var("DATABASE_URL")?))
        .merge(Serialized::default("secret_key", required_var("SECRET_KEY")?));

    if let Ok(port) = std::env::var("PORT") {
        figment = figment.merge(Serialized::default("listen_addr", format!("0.0.0.0:{port}")));
    }

    figment = figment.merge(Env::prefixed("WAGATE_").split("__"));

    validate(figment.extract()?)
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("required environment variable {name} is not set"))
}

fn validate(config: ServerConfig) -> anyhow::Result<ServerConfig> {
    if config.secret_key.trim().is_empty() {
        anyhow::bail!("SECRET_KEY must be a non-empty value");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config() -> wagate_data::DbConfig {
        wagate_data::DbConfig {
            url: "postgres://localhost/gateway".into(),
            pool_size: 10,
            min_idle: Some(1),
            connection_timeout: 5_000,
            statement_timeout: 30_000,
            helper_threads: 3,
            enforce_tls: false,
            tcp_timeout: 10_000,
        }
    }

    fn sample_config(secret_key: impl Into<String>) -> ServerConfig {
        ServerConfig {
            listen_addr: default_listen_addr(),
            api_prefix: default_api_prefix(),
            secret_key: secret_key.into(),
            db: db_config(),
            rust_log: default_rust_log(),
            log_format: default_log_format(),
            qr_wait_seconds: default_qr_wait_seconds(),
            connect_wait_seconds: default_connect_wait_seconds(),
            warmup_wait_seconds: default_warmup_wait_seconds(),
        }
    }

    #[test]
    fn rejects_a_blank_secret_key() {
        assert!(validate(sample_config("   ")).is_err());
    }

    #[test]
    fn accepts_a_non_blank_secret_key() {
        assert!(validate(sample_config("shh")).is_ok());
    }
}
