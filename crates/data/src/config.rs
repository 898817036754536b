use serde::Deserialize;

/// Pool and connection tuning, embedded in the server's top-level config under
/// the `db` key (mirrors the `ServerConfig.db: DbConfig` split used upstream).
#[derive(Clone, Debug, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_min_idle")]
    pub min_idle: Option<u32>,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout: u64,
    #[serde(default = "default_helper_threads")]
    pub helper_threads: usize,
    #[serde(default = "default_false")]
    pub enforce_tls: bool,
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout: u64,
}

fn default_pool_size() -> u32 {
    10
}
fn default_min_idle() -> Option<u32> {
    Some(1)
}
fn default_connection_timeout() -> u64 {
    5_000
}
fn default_statement_timeout() -> u64 {
    30_000
}
fn default_helper_threads() -> usize {
    3
}
fn default_false() -> bool {
    false
}
fn default_tcp_timeout() -> u64 {
    10_000
}
