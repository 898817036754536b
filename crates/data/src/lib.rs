//! Diesel/Postgres persistence for the gateway: the Tenant Key Registry,
//! Credential Store, and Session Lock.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, CustomizeConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use scheduled_thread_pool::ScheduledThreadPool;
use url::Url;

pub mod config;
pub mod credentials;
pub mod keys;
pub mod locks;
pub mod pool;
pub mod schema;
pub mod sessions;

pub use config::DbConfig;
pub use pool::{DieselPool, PgPooledConnection, PoolError};

impl From<PoolError> for wagate_core::error::GatewayError {
    fn from(err: PoolError) -> Self {
        wagate_core::error::GatewayError::internal(err)
    }
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

static DIESEL_POOL: OnceLock<DieselPool> = OnceLock::new();

/// Builds the pool, runs pending migrations, and stashes the pool in a
/// process-wide static (mirrors the upstream `db::init` + `DIESEL_POOL`
/// split so `connect()` stays call-site-ergonomic everywhere downstream).
pub fn init(config: &DbConfig) -> Result<(), PoolError> {
    let builder = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(Duration::from_millis(config.connection_timeout))
        .connection_customizer(Box::new(ConnectionConfig {
            statement_timeout: config.statement_timeout,
        }))
        .thread_pool(Arc::new(ScheduledThreadPool::new(config.helper_threads)));

    let pool = DieselPool::new(&config.url, config, builder)?;
    DIESEL_POOL.set(pool).map_err(|_| PoolError::UnhealthyPool)?;
    migrate();
    Ok(())
}

fn migrate() {
    let mut conn = connect().expect("db connect should work for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("pending migrations should apply cleanly");
}

pub fn connect() -> Result<PgPooledConnection, PoolError> {
    DIESEL_POOL.get().expect("diesel pool should be initialised").get()
}

pub fn connection_url(config: &DbConfig, url: &str) -> String {
    let mut url = Url::parse(url).expect("DATABASE_URL should be a valid URL");

    if config.enforce_tls {
        maybe_append_url_param(&mut url, "sslmode", "require");
    }
    maybe_append_url_param(&mut url, "tcp_user_timeout", &config.tcp_timeout.to_string());

    url.into()
}

fn maybe_append_url_param(url: &mut Url, key: &str, value: &str) {
    if !url.query_pairs().any(|(k, _)| k == key) {
        url.query_pairs_mut().append_pair(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enforce_tls: bool) -> DbConfig {
        DbConfig {
            url: "postgres://localhost/gateway".into(),
            pool_size: 10,
            min_idle: Some(1),
            connection_timeout: 5_000,
            statement_timeout: 30_000,
            helper_threads: 3,
            enforce_tls,
            tcp_timeout: 10_000,
        }
    }

    #[test]
    fn appends_sslmode_only_when_tls_is_enforced() {
        let plain = connection_url(&config(false), "postgres://localhost/gateway");
        assert!(!plain.contains("sslmode"));

        let tls = connection_url(&config(true), "postgres://localhost/gateway");
        assert!(tls.contains("sslmode=require"));
    }

    #[test]
    fn does_not_duplicate_an_existing_query_param() {
        let url = connection_url(&config(false), "postgres://localhost/gateway?tcp_user_timeout=1");
        assert_eq!(url.matches("tcp_user_timeout").count(), 1);
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionConfig {
    statement_timeout: u64,
}

impl CustomizeConnection<PgConnection, r2d2::Error> for ConnectionConfig {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), r2d2::Error> {
        diesel::sql_query(format!("SET statement_timeout = {}", self.statement_timeout))
            .execute(conn)
            .map_err(r2d2::Error::QueryError)?;
        Ok(())
    }
}
